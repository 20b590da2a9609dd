//! On-device breakdown generator.
//!
//! Pure text splitting: no I/O, never fails, never blocks.

use crate::net::contracts::BreakdownStep;

pub const MAX_LOCAL_STEPS: i32 = 6;
pub const PLACEHOLDER_STEP: &str = "Review the task and define the first step";

const SENTENCE_DELIMITERS: [char; 3] = ['.', '!', '?'];

pub trait OnDeviceGenerator: Send + Sync {
    fn generate(
        &self,
        input_text: &str,
        granularity: i32,
        context_hints: &[String],
        template_ids: &[String],
    ) -> Vec<BreakdownStep>;
}

/// Splits on sentence terminators and labels each sentence as a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleOnDeviceGenerator;

impl OnDeviceGenerator for SimpleOnDeviceGenerator {
    fn generate(
        &self,
        input_text: &str,
        granularity: i32,
        _context_hints: &[String],
        _template_ids: &[String],
    ) -> Vec<BreakdownStep> {
        let max_steps = max_steps_for(granularity);
        let steps: Vec<BreakdownStep> = input_text
            .split(SENTENCE_DELIMITERS)
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .take(max_steps)
            .enumerate()
            .map(|(index, piece)| BreakdownStep::new(format!("Step {}: {piece}", index + 1)))
            .collect();

        if steps.is_empty() {
            return vec![BreakdownStep::new(PLACEHOLDER_STEP)];
        }
        steps
    }
}

/// `clamp(granularity + 1, 1, 6)`, saturating on extreme inputs.
pub fn max_steps_for(granularity: i32) -> usize {
    let capped = granularity.saturating_add(1).clamp(1, MAX_LOCAL_STEPS);
    usize::try_from(capped).unwrap_or(1)
}
