//! Pluggable strategy selection with a fallback chain.
//!
//! Implementations register a factory under an identifier. Selection walks
//! an ordered candidate list (a configured override first, then the
//! built-in defaults) and keeps the first implementation whose factory
//! succeeds. A failing candidate is recorded and skipped, only running out
//! of candidates is an error.

use ahash::{HashMap, HashMapExt};
use anyhow::{Result, anyhow};

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// A candidate that could not be instantiated.
#[derive(Debug)]
pub struct Attempt {
    pub name: String,
    pub cause: anyhow::Error,
}

/// The winning implementation together with the candidates tried before it.
pub struct Selected<T> {
    pub name: String,
    pub strategy: T,
    pub failures: Vec<Attempt>,
}

/// Every candidate failed.
#[derive(Debug)]
pub struct NoImplementationAvailable {
    pub attempted: Vec<String>,
    pub last_cause: Option<anyhow::Error>,
}

impl std::error::Error for NoImplementationAvailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_cause
            .as_ref()
            .map(|it| &**it as &(dyn std::error::Error + 'static))
    }
}

impl std::fmt::Display for NoImplementationAvailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no implementation available, attempted=[{}]", self.attempted.join(", "))?;

        if let Some(cause) = &self.last_cause {
            write!(f, ", last cause={cause}")?;
        }

        Ok(())
    }
}

/// Builds the ordered candidate list.
///
/// The override comes first when it is present and not blank, the
/// fallbacks follow with duplicates removed.
///
/// # Test
///
/// ```
/// use rtp_transport_service::strategy::candidates;
///
/// assert_eq!(candidates(Some("b"), &["a", "b", "c"]), vec!["b", "a", "c"]);
/// assert_eq!(candidates(Some("  "), &["a", "b"]), vec!["a", "b"]);
/// assert_eq!(candidates(None, &["a", "a", "b"]), vec!["a", "b"]);
/// ```
pub fn candidates(override_name: Option<&str>, fallbacks: &[&str]) -> Vec<String> {
    let mut list: Vec<String> = Vec::with_capacity(fallbacks.len() + 1);

    let first = override_name.map(str::trim).filter(|it| !it.is_empty());
    for name in first.into_iter().chain(fallbacks.iter().copied()) {
        if !list.iter().any(|it| it == name) {
            list.push(name.to_string());
        }
    }

    list
}

/// Identifier to factory table for one kind of strategy.
pub struct StrategyRegistry<T> {
    factories: HashMap<String, Factory<T>>,
}

impl<T> Default for StrategyRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> StrategyRegistry<T> {
    /// Registers a factory, replacing any previous one under the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Tries the override, then the fallbacks, see [`candidates`].
    pub fn select(
        &self,
        override_name: Option<&str>,
        fallbacks: &[&str],
    ) -> Result<Selected<T>, NoImplementationAvailable> {
        self.select_from(&candidates(override_name, fallbacks))
    }

    /// Tries the candidates in order and keeps the first one that builds.
    pub fn select_from(&self, candidates: &[String]) -> Result<Selected<T>, NoImplementationAvailable> {
        let mut failures = Vec::new();

        for name in candidates {
            let result = match self.factories.get(name) {
                Some(factory) => factory(),
                None => Err(anyhow!("no implementation registered as {name:?}")),
            };

            match result {
                Ok(strategy) => {
                    log::info!(
                        "strategy selected: name={name}, failed attempts={}",
                        failures.len()
                    );

                    return Ok(Selected {
                        name: name.clone(),
                        strategy,
                        failures,
                    });
                }
                Err(cause) => {
                    log::debug!("strategy unavailable: name={name}, err={cause}");

                    failures.push(Attempt {
                        name: name.clone(),
                        cause,
                    });
                }
            }
        }

        Err(NoImplementationAvailable {
            attempted: candidates.to_vec(),
            last_cause: failures.pop().map(|it| it.cause),
        })
    }
}
