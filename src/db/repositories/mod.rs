mod auth_sessions;
mod cursor_dwell;
mod events;
mod page_sessions;
mod user_scores;
mod video_progress;

pub use video_progress::VideoProgressFilter;
