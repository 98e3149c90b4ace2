use serde::{Deserialize, Serialize};

/// Shape and name of one trainable tensor inside the flat parameter vector.
///
/// An ordered list of specs fully describes a model's parameter layout: the
/// store, the checkpoint format and the workers' local buffers all follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Number of scalar parameters in this tensor.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
