//! Outcome classification: decides whether a completed call counts as a
//! success or as a breaker failure, from its status code alone.

/// Policy mapping a response status to success or failure
pub trait OutcomeClassifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` when `status` should be treated as a success
    fn is_success(&self, status: u16) -> bool;
}

/// Default policy: membership in an allow-list, or `status < 400` without one
///
/// An empty allow-list behaves like no allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusAllowList {
    allowed: Option<Vec<u16>>,
}

impl StatusAllowList {
    pub fn new(allowed: Option<Vec<u16>>) -> Self {
        Self {
            allowed: allowed.filter(|list| !list.is_empty()),
        }
    }

    pub fn only(allowed: impl Into<Vec<u16>>) -> Self {
        Self::new(Some(allowed.into()))
    }
}

impl OutcomeClassifier for StatusAllowList {
    fn is_success(&self, status: u16) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(&status),
            None => status < 400,
        }
    }
}

/// Classifier built from a closure
pub struct PredicateClassifier<F>
where
    F: Fn(u16) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(u16) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> OutcomeClassifier for PredicateClassifier<F>
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn is_success(&self, status: u16) -> bool {
        (self.predicate)(status)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(u16) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
