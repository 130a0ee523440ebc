use crate::{
    db::models::{DwellAttributes, DwellInput, DwellSample},
    errors::TrackingError,
};

/// Validates raw dwell items and drops the ones that would change nothing.
/// Any invalid item rejects the whole batch.
pub fn validate_dwell_batch(inputs: Vec<DwellInput>) -> Result<Vec<DwellSample>, TrackingError> {
    let mut samples = Vec::with_capacity(inputs.len());

    for input in inputs {
        let target_key = input.target_key;
        if target_key.trim().is_empty() {
            return Err(TrackingError::validation("dwell item is missing a target_key"));
        }
        let duration_ms = u64::try_from(input.duration_ms).map_err(|_| {
            TrackingError::validation(format!(
                "duration_ms for {target_key:?} must be non-negative"
            ))
        })?;
        let entry_count = u64::try_from(input.entry_count.unwrap_or(0)).map_err(|_| {
            TrackingError::validation(format!(
                "entry_count for {target_key:?} must be non-negative"
            ))
        })?;

        let sample = DwellSample {
            target_key,
            duration_ms,
            entry_count,
            attributes: DwellAttributes {
                label: input.label,
                center_x: input.center_x,
                center_y: input.center_y,
                radius: input.radius,
                metadata: input.metadata,
            },
        };
        if !sample.is_noop() {
            samples.push(sample);
        }
    }

    Ok(samples)
}
