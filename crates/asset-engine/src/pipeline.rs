//! # Provider Pipeline
//!
//! The chain-of-responsibility core of the engine: an ordered list of
//! providers is walked until one of them has an opinion, then every provider
//! that was consulted gets a chance to react to the result — in reverse
//! order, so faster tiers are backfilled from slower ones.
//!
//! A provider answers with one of three outcomes: it found the content, it
//! knows the content does not exist, or it has no opinion and the next
//! provider should be asked. The distinction between "does not exist" and
//! "nobody knew" is collapsed to `None` at the pipeline boundary; only the
//! providers themselves see the difference.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

/// Result of a single provider lookup.
///
/// The tags are disjoint from the payload itself: a provider returning
/// `Found` with empty content is a hit, not a miss. Consumers must branch on
/// the tag, never on emptiness of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<C> {
    /// The provider has the content.
    Found(C),
    /// The content definitively does not exist; stop searching.
    DoesNotExist,
    /// The provider has no opinion; ask the next one.
    ContinueSearch,
}

impl<C> Outcome<C> {
    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }
}

/// A single content-lookup strategy.
///
/// `retrieve` performs the lookup. `on_resolved` is the cache-fill hook,
/// invoked after a search finished for every provider that was consulted;
/// `was_winner` is true for the provider whose outcome terminated the search,
/// and the universal rule is that a provider never re-persists a value it
/// supplied itself.
#[async_trait]
pub trait Provider<P: Sync, C: Sync>: Send + Sync {
    /// Diagnostic label used in logs.
    fn name(&self) -> &'static str;

    async fn retrieve(&self, params: &P) -> Outcome<C>;

    /// React to the finished search. `content` is `None` both when the
    /// winner said [`Outcome::DoesNotExist`] and when every provider passed.
    async fn on_resolved(&self, was_winner: bool, params: &P, content: Option<&C>) {
        let _ = (was_winner, params, content);
    }
}

/// An ordered, immutable chain of providers for one parameter/content pairing.
///
/// Ordering encodes a cost/completeness trade-off: cheapest and most local
/// providers first. Each miss is an opportunity to backfill the faster tiers
/// once a slower tier succeeds.
pub struct Pipeline<P, C> {
    providers: Vec<Arc<dyn Provider<P, C>>>,
}

impl<P, C> Pipeline<P, C>
where
    P: Send + Sync,
    C: Send + Sync,
{
    pub fn new(providers: Vec<Arc<dyn Provider<P, C>>>) -> Self {
        Self { providers }
    }

    /// Walk the chain, then run the reverse cache-fill pass.
    ///
    /// Returns the winning provider's content, or `None` when the winner
    /// reported nonexistence or the search was exhausted — callers cannot
    /// tell those two apart.
    pub async fn resolve(&self, params: &P) -> Option<C> {
        if self.providers.is_empty() {
            return None;
        }

        let mut winner: Option<usize> = None;
        let mut content: Option<C> = None;

        for (idx, provider) in self.providers.iter().enumerate() {
            match provider.retrieve(params).await {
                Outcome::ContinueSearch => continue,
                Outcome::DoesNotExist => {
                    info!(provider = provider.name(), "provider reported nonexistence");
                    winner = Some(idx);
                    break;
                }
                Outcome::Found(payload) => {
                    info!(provider = provider.name(), "provider returned content");
                    winner = Some(idx);
                    content = Some(payload);
                    break;
                }
            }
        }

        if winner.is_none() {
            info!("no provider found content");
        }

        // Notify every consulted provider, last-consulted first, so cache
        // tiers closer to the front are filled after the tiers behind them.
        let consulted = winner.map_or(self.providers.len(), |idx| idx + 1);
        for (idx, provider) in self.providers.iter().enumerate().take(consulted).rev() {
            provider
                .on_resolved(winner == Some(idx), params, content.as_ref())
                .await;
        }

        content
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const VALID_PARAM_1: &str = "param-1";
    const VALID_PARAM_2: &str = "param-2";
    const INVALID_PARAM_A: &str = "invalid-param-A";
    const INVALID_PARAM_B: &str = "invalid-param-B";

    const RESPONSE_1: &str = "response-1";
    const RESPONSE_2: &str = "response-2";

    /// Append-only record of `on_resolved` calls, shared between providers
    /// so notification order is observable across the whole chain.
    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<(&'static str, bool, String, Option<String>)>>,
    }

    impl Journal {
        fn record(&self, name: &'static str, was_winner: bool, params: &str, content: Option<&String>) {
            self.entries
                .lock()
                .push((name, was_winner, params.to_string(), content.cloned()));
        }

        fn entries(&self) -> Vec<(&'static str, bool, String, Option<String>)> {
            self.entries.lock().clone()
        }
    }

    struct AnswersFor {
        name: &'static str,
        param: &'static str,
        response: &'static str,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Provider<String, String> for AnswersFor {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn retrieve(&self, params: &String) -> Outcome<String> {
            if params == self.param {
                Outcome::Found(self.response.to_string())
            } else {
                Outcome::ContinueSearch
            }
        }

        async fn on_resolved(&self, was_winner: bool, params: &String, content: Option<&String>) {
            self.journal.record(self.name, was_winner, params, content);
        }
    }

    struct DeniesFor {
        param: &'static str,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Provider<String, String> for DeniesFor {
        fn name(&self) -> &'static str {
            "denier"
        }

        async fn retrieve(&self, params: &String) -> Outcome<String> {
            if params == self.param {
                Outcome::DoesNotExist
            } else {
                Outcome::ContinueSearch
            }
        }

        async fn on_resolved(&self, was_winner: bool, params: &String, content: Option<&String>) {
            self.journal.record("denier", was_winner, params, content);
        }
    }

    fn two_tier_pipeline(journal: &Arc<Journal>) -> Pipeline<String, String> {
        Pipeline::new(vec![
            Arc::new(AnswersFor {
                name: "first",
                param: VALID_PARAM_1,
                response: RESPONSE_1,
                journal: journal.clone(),
            }),
            Arc::new(AnswersFor {
                name: "second",
                param: VALID_PARAM_2,
                response: RESPONSE_2,
                journal: journal.clone(),
            }),
        ])
    }

    #[tokio::test]
    async fn first_provider_wins_and_later_tiers_are_not_notified() {
        let journal = Arc::new(Journal::default());
        let pipeline = two_tier_pipeline(&journal);

        let content = pipeline.resolve(&VALID_PARAM_1.to_string()).await;
        assert_eq!(content.as_deref(), Some(RESPONSE_1));

        // Only the winner itself was consulted, so only it is notified.
        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0],
            (
                "first",
                true,
                VALID_PARAM_1.to_string(),
                Some(RESPONSE_1.to_string())
            )
        );
    }

    #[tokio::test]
    async fn second_tier_win_notifies_both_in_reverse_order() {
        let journal = Arc::new(Journal::default());
        let pipeline = two_tier_pipeline(&journal);

        let content = pipeline.resolve(&VALID_PARAM_2.to_string()).await;
        assert_eq!(content.as_deref(), Some(RESPONSE_2));

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        // Last-consulted provider is notified first.
        assert_eq!(entries[0].0, "second");
        assert!(entries[0].1, "winner sees was_winner = true");
        assert_eq!(entries[1].0, "first");
        assert!(!entries[1].1);
        assert_eq!(entries[1].3, Some(RESPONSE_2.to_string()));
    }

    #[tokio::test]
    async fn exhausted_search_notifies_everyone_with_absent_content() {
        let journal = Arc::new(Journal::default());
        let pipeline = two_tier_pipeline(&journal);

        let content = pipeline.resolve(&INVALID_PARAM_A.to_string()).await;
        assert!(content.is_none());

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("second", false, INVALID_PARAM_A.to_string(), None));
        assert_eq!(entries[1], ("first", false, INVALID_PARAM_A.to_string(), None));
    }

    #[tokio::test]
    async fn does_not_exist_sets_a_winner_but_yields_no_content() {
        let journal = Arc::new(Journal::default());
        let pipeline: Pipeline<String, String> = Pipeline::new(vec![
            Arc::new(DeniesFor {
                param: VALID_PARAM_1,
                journal: journal.clone(),
            }),
            Arc::new(AnswersFor {
                name: "never-reached",
                param: VALID_PARAM_1,
                response: RESPONSE_1,
                journal: journal.clone(),
            }),
        ]);

        let content = pipeline.resolve(&VALID_PARAM_1.to_string()).await;
        assert!(content.is_none(), "DoesNotExist collapses to None");

        // The denier terminated the search, so the provider behind it was
        // never consulted and never notified.
        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "denier");
        assert!(entries[0].1, "winner is recorded even on DoesNotExist");
        assert_eq!(entries[0].3, None);
    }

    #[tokio::test]
    async fn empty_pipeline_resolves_to_none() {
        let pipeline: Pipeline<String, String> = Pipeline::new(Vec::new());
        assert!(pipeline.resolve(&VALID_PARAM_1.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let journal = Arc::new(Journal::default());
        let pipeline = two_tier_pipeline(&journal);

        let first = pipeline.resolve(&VALID_PARAM_2.to_string()).await;
        let second = pipeline.resolve(&VALID_PARAM_2.to_string()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unqueried_params_leave_no_trace() {
        let journal = Arc::new(Journal::default());
        let pipeline = two_tier_pipeline(&journal);

        pipeline.resolve(&INVALID_PARAM_A.to_string()).await;
        let entries = journal.entries();
        assert!(entries.iter().all(|(_, _, p, _)| p != INVALID_PARAM_B));
    }
}
