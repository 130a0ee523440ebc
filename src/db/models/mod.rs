pub mod cursor_dwell;
pub mod event;
pub mod identity;
pub mod page_session;
pub mod user_score;
pub mod video_progress;

pub use cursor_dwell::{CursorDwellMetric, DwellAttributes, DwellInput, DwellSample};
pub use event::{Event, EventCounterDelta, EventInput, NewEvent, CLICK_EVENT_TYPE};
pub use identity::{AuthSession, User};
pub use page_session::{
    PageSession, PageSessionFinalization, PageSessionStatus, SessionBinding, SessionRejection,
};
pub use user_score::{ScoreSummary, UserScore};
pub use video_progress::{VideoProgress, VideoProgressInput, VideoProgressQuery};
