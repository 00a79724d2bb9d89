//! Transformation pipeline.

use super::{create_transformation, set_id_for, Transformation};
use crate::error::Result;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::warn;

/// An ordered list of transformations with a stable set identity.
///
/// Pushing `none` empties the pipeline. The set id identifies the exact
/// transformation sequence process-wide and keys the per-transaction
/// result cache; the empty pipeline has id zero.
#[derive(Clone, Default)]
pub struct TransformationPipeline {
    items: Vec<Arc<dyn Transformation>>,
    set_id: usize,
}

impl TransformationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transformation by name, or clear the pipeline on `none`.
    pub fn push(&mut self, name: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("none") {
            self.clear();
            return Ok(());
        }
        let t = create_transformation(name)?;
        self.set_id = set_id_for(self.set_id, &name.to_lowercase());
        self.items.push(t);
        Ok(())
    }

    /// Drop every transformation.
    pub fn clear(&mut self) {
        self.items.clear();
        self.set_id = 0;
    }

    /// Identity of this transformation sequence.
    pub fn set_id(&self) -> usize {
        self.set_id
    }

    /// Whether the pipeline holds no transformations.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of transformations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Apply the pipeline, keeping the value from the last successful
    /// transformation when one fails. Returns the final value and the
    /// collected failure messages.
    pub fn apply(&self, input: &str) -> (String, Vec<String>) {
        let mut value = input.to_string();
        let mut errors = Vec::new();
        for t in &self.items {
            match t.transform(&value) {
                Ok(Cow::Borrowed(_)) => {}
                Ok(Cow::Owned(new)) => value = new,
                Err(err) => {
                    warn!(transformation = t.name(), error = %err, "transformation failed");
                    errors.push(err.to_string());
                }
            }
        }
        (value, errors)
    }

    /// Apply the pipeline in multi-match mode: the original value plus
    /// every intermediate that a transformation actually changed.
    pub fn apply_multi(&self, input: &str) -> (Vec<String>, Vec<String>) {
        let mut values = vec![input.to_string()];
        let mut current = input.to_string();
        let mut errors = Vec::new();
        for t in &self.items {
            match t.transform(&current) {
                Ok(Cow::Borrowed(_)) => {}
                Ok(Cow::Owned(new)) => {
                    if new != current {
                        current = new;
                        values.push(current.clone());
                    }
                }
                Err(err) => {
                    warn!(transformation = t.name(), error = %err, "transformation failed");
                    errors.push(err.to_string());
                }
            }
        }
        (values, errors)
    }
}

impl std::fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationPipeline")
            .field(
                "items",
                &self.items.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("set_id", &self.set_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn pipeline(names: &[&str]) -> TransformationPipeline {
        let mut p = TransformationPipeline::new();
        for name in names {
            p.push(name).unwrap();
        }
        p
    }

    #[test]
    fn empty_pipeline_passes_through() {
        let p = TransformationPipeline::new();
        let (value, errors) = p.apply("Hello");
        assert_eq!(value, "Hello");
        assert!(errors.is_empty());
        assert_eq!(p.set_id(), 0);
    }

    #[test]
    fn applies_in_sequence() {
        let p = pipeline(&["urlDecode", "lowercase"]);
        let (value, _) = p.apply("HELLO%20WORLD");
        assert_eq!(value, "hello world");
    }

    #[test]
    fn none_clears_accumulated_transformations() {
        let p = pipeline(&["lowercase", "none", "uppercase"]);
        assert_eq!(p.len(), 1);
        let (value, _) = p.apply("hello");
        assert_eq!(value, "HELLO");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let mut p = TransformationPipeline::new();
        assert!(matches!(
            p.push("rot13"),
            Err(Error::UnknownTransformation { .. })
        ));
    }

    #[test]
    fn equal_pipelines_share_a_set_id() {
        let a = pipeline(&["lowercase", "trim"]);
        let b = pipeline(&["lowercase", "trim"]);
        let c = pipeline(&["trim", "lowercase"]);
        assert_eq!(a.set_id(), b.set_id());
        assert_ne!(a.set_id(), c.set_id());
        assert_ne!(a.set_id(), 0);
    }

    #[test]
    fn multi_mode_keeps_original_and_changed_intermediates() {
        let p = pipeline(&["trim", "lowercase", "trim"]);
        let (values, errors) = p.apply_multi("  AbC  ");
        assert_eq!(values, vec!["  AbC  ", "AbC", "abc"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn failing_transformation_keeps_last_good_value() {
        struct Failing;
        impl Transformation for Failing {
            fn transform<'a>(&self, _input: &'a str) -> Result<Cow<'a, str>> {
                Err(Error::config("boom"))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }
        let mut p = pipeline(&["lowercase"]);
        p.items.push(Arc::new(Failing));
        let (value, errors) = p.apply("ABC");
        assert_eq!(value, "abc");
        assert_eq!(errors.len(), 1);
    }
}
