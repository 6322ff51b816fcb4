//! Tri-state resolution of hedging intent across configuration scopes.
//!
//! A scope either says nothing ([`ResolvedStrategy::Unset`]), forbids hedging
//! ([`ResolvedStrategy::ExplicitlyDisabled`]), or turns it on with thresholds
//! ([`ResolvedStrategy::Active`]). Inner scopes override outer ones in both
//! directions; an unset inner scope defers to the next outer one.

use crate::{
    config::{RawStrategyInput, ResolvedStrategy, StrategyConfig},
    errors::ConfigError,
};

/// Stateless resolver for hedging strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyResolver;

impl StrategyResolver {
    /// Maps raw caller input to a scope-level decision.
    ///
    /// - absent → `Unset`
    /// - `true` → `Active` with default thresholds
    /// - `false` → `ExplicitlyDisabled`
    /// - options → `Active` with those thresholds, defaulting missing keys
    pub fn interpret(input: Option<&RawStrategyInput>) -> Result<ResolvedStrategy, ConfigError> {
        Ok(match input {
            None => ResolvedStrategy::Unset,
            Some(RawStrategyInput::Enabled(true)) => {
                ResolvedStrategy::Active(StrategyConfig::default())
            }
            Some(RawStrategyInput::Enabled(false)) => ResolvedStrategy::ExplicitlyDisabled,
            Some(RawStrategyInput::Config(options)) => {
                ResolvedStrategy::Active(StrategyConfig::from_options(options)?)
            }
        })
    }

    /// Resolves the effective strategy for one operation.
    ///
    /// An operation-level `Active` or `ExplicitlyDisabled` wins outright; an
    /// absent override leaves `client_default` as-is.
    pub fn resolve(
        client_default: &ResolvedStrategy,
        operation_override: Option<&RawStrategyInput>,
    ) -> Result<ResolvedStrategy, ConfigError> {
        let operation = Self::interpret(operation_override)?;
        Ok(Self::resolve_scopes([*client_default, operation]))
    }

    /// Folds any number of scopes, ordered outermost to innermost.
    ///
    /// The innermost scope that is not `Unset` decides. An empty sequence, or
    /// one made only of `Unset` scopes, resolves to `Unset`.
    pub fn resolve_scopes<I>(scopes: I) -> ResolvedStrategy
    where
        I: IntoIterator<Item = ResolvedStrategy>,
    {
        scopes
            .into_iter()
            .fold(ResolvedStrategy::Unset, ResolvedStrategy::overridden_by)
    }
}
