use crate::progress::Phase;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid transition: cannot {action} while {from:?}")]
    InvalidTransition { from: Phase, action: &'static str },

    #[error("Decode error: {0}")]
    Decode(String),
}
