use std::future::Future;

use async_trait::async_trait;

use super::DynError;

/// A unit of test work the chaos plugin can wrap.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), DynError>;
}

/// Adapts an async closure into a [`Scenario`].
pub struct FnScenario<F> {
    name: String,
    body: F,
}

impl<F, Fut> FnScenario<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), DynError>> + Send,
{
    #[must_use]
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[async_trait]
impl<F, Fut> Scenario for FnScenario<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), DynError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), DynError> {
        (self.body)().await
    }
}
