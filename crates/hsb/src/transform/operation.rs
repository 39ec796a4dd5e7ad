//! Registry of the transform operations and their gradients.

use std::fmt;

use crate::error::HsbError;

/// The three batch operations exposed to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Logits to leaf probabilities.
    Forward,
    /// Leaf probabilities to ratios and log-Jacobian.
    Inverse,
    /// Gradient of [`Operation::Inverse`] with respect to its input.
    InverseGradient,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::Forward,
        Operation::Inverse,
        Operation::InverseGradient,
    ];

    /// Name under which a host registers the operation.
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Forward => "hsb",
            Operation::Inverse => "inv_hsb",
            Operation::InverseGradient => "inv_hsb_grad",
        }
    }

    /// The operation computing this operation's gradient.
    ///
    /// Only [`Operation::Inverse`] has one. The forward map is used for
    /// sampling and has no registered gradient.
    ///
    /// # Errors
    ///
    /// [`HsbError::GradientNotSupported`] for every other operation.
    pub fn gradient(self) -> Result<Operation, HsbError> {
        match self {
            Operation::Inverse => Ok(Operation::InverseGradient),
            op => Err(HsbError::GradientNotSupported { op: op.name() }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_inverse_is_differentiable() {
        assert_eq!(Operation::Inverse.gradient().unwrap(), Operation::InverseGradient);
        assert!(matches!(
            Operation::Forward.gradient(),
            Err(HsbError::GradientNotSupported { op: "hsb" })
        ));
        assert!(Operation::InverseGradient.gradient().is_err());
    }

    #[test]
    fn names_are_distinct() {
        let names: std::collections::HashSet<_> =
            Operation::ALL.iter().map(|op| op.to_string()).collect();
        assert_eq!(names.len(), 3);
    }
}
