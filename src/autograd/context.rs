//! Execution mode for forward passes

/// Train/eval switch consulted by backbones during a forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    training: bool,
}

impl Context {
    /// Create a context in training mode
    pub fn new() -> Self {
        Self { training: true }
    }

    /// Context in evaluation mode
    pub fn evaluation() -> Self {
        Self { training: false }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
