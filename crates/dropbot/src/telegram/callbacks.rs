//! Inline-keyboard callback data codec.
//!
//! Format: `cat:<category code>`, `mode:<direct|command>` or `back`.

use dropcore::core::error::JobError;
use dropcore::{Category, DeliveryMode, MenuOption, SessionEvent};

const CATEGORY_PREFIX: &str = "cat:";
const MODE_PREFIX: &str = "mode:";
const BACK: &str = "back";

/// Callback data for a menu option (well under Telegram's 64-byte limit).
pub fn encode(option: &MenuOption) -> String {
    match option {
        MenuOption::Category(category) => format!("{}{}", CATEGORY_PREFIX, category.as_code()),
        MenuOption::Mode(mode) => format!("{}{}", MODE_PREFIX, mode.as_code()),
        MenuOption::Back => BACK.to_string(),
    }
}

/// Turns callback data back into a session event.
///
/// Anything outside the closed set fails with `UnsupportedCategory`.
pub fn decode(data: &str) -> Result<SessionEvent, JobError> {
    if data == BACK {
        return Ok(SessionEvent::BackRequested);
    }
    if let Some(code) = data.strip_prefix(CATEGORY_PREFIX) {
        return Category::from_code(code).map(SessionEvent::CategoryChosen);
    }
    if let Some(code) = data.strip_prefix(MODE_PREFIX) {
        return DeliveryMode::from_code(code)
            .map(SessionEvent::DeliveryModeChosen)
            .ok_or_else(|| JobError::UnsupportedCategory(data.to_string()));
    }
    Err(JobError::UnsupportedCategory(data.to_string()))
}
