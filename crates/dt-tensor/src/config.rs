use crate::dtype::DType;

/// What a [`Context`](crate::context::Context) does when a caller breaks a
/// precondition of this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContractAction {
    /// Log the violated contract and abort the process.
    #[default]
    Abort,
    /// Return `TensorError::ContractViolation` to the caller.
    Return,
}

/// Policy knobs for an execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Reaction to contract violations.
    pub contract_action: ContractAction,
    /// Dtype a gather is performed in when the backend does not support the
    /// gather for the source dtype.
    pub gather_fallback: DType,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            contract_action: ContractAction::default(),
            gather_fallback: DType::F32,
        }
    }
}

impl LayoutConfig {
    pub fn with_contract_action(mut self, action: ContractAction) -> Self {
        self.contract_action = action;
        self
    }

    pub fn with_gather_fallback(mut self, dtype: DType) -> Self {
        self.gather_fallback = dtype;
        self
    }
}
