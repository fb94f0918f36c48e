//! Content validation
//!
//! The pipeline treats validation as an opaque capability: it hands the
//! retrieved bytes to a [`Validator`] and records whatever [`Verdict`] comes
//! back. A validator that returns [`ValidationFailure`] (or panics) produces an
//! `invalid` outcome for that file only.

use crate::error::ValidationFailure;
use crate::types::Verdict;

mod delimited;

pub use delimited::CsvValidator;

/// Inspects file content and reports errors, warnings and informational notes
///
/// Implementations must not depend on external mutable state and must accept
/// any byte sequence, including empty or garbage input.
pub trait Validator: Send + Sync {
    /// Validate one file's content
    fn validate(&self, content: &[u8]) -> Result<Verdict, ValidationFailure>;
}

impl<F> Validator for F
where
    F: Fn(&[u8]) -> Result<Verdict, ValidationFailure> + Send + Sync,
{
    fn validate(&self, content: &[u8]) -> Result<Verdict, ValidationFailure> {
        self(content)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationState;

    #[test]
    fn closures_are_validators() {
        let non_empty = |content: &[u8]| -> Result<Verdict, ValidationFailure> {
            let mut verdict = Verdict::default();
            if content.is_empty() {
                verdict.errors.push("empty file".into());
            }
            Ok(verdict)
        };

        assert_eq!(non_empty.validate(b"").unwrap().state(), ValidationState::Invalid);
        assert_eq!(non_empty.validate(b"a,b").unwrap().state(), ValidationState::Valid);
    }
}
