//! # Courtbook Core
//!
//! Core traits and types shared by the Courtbook booking engine.
//!
//! This crate holds the domain-agnostic pieces the engine is assembled from:
//!
//! - **Reducer**: pure decision function `(State, Action, Environment) → Events | Error`
//! - **Environment**: injected dependencies behind traits (the [`environment::Clock`])
//! - **Version**: document versions for optimistic concurrency control
//! - **Store**: the error taxonomy every persistence collaborator speaks
//! - **Retry**: re-running read-decide-write cycles that lost a race
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Every write is conditional on the version that was read
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use courtbook_core::reducer::Reducer;
//!
//! impl Reducer for GameReducer {
//!     type State = Game;
//!     type Action = GameAction;
//!     type Event = GameEvent;
//!     type Error = GameError;
//!     type Environment = GameEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Game,
//!         action: GameAction,
//!         env: &GameEnvironment,
//!     ) -> Result<SmallVec<[GameEvent; 4]>, GameError> {
//!         // Business logic goes here
//!         Ok(SmallVec::new())
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub mod retry;
pub mod store;
pub mod version;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Events | Error`.
///
/// They contain all business rules and are deterministic and testable. A reducer
/// validates the action against the current state, and either rejects it with a
/// typed error (leaving the state untouched) or produces the events describing
/// what happened and applies them to the state in place.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The commands this reducer accepts
    /// - `Event`: The facts this reducer records
    /// - `Error`: Why a command was rejected
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The events produced by accepted actions
        type Event;

        /// The rejection type
        type Error;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes
        ///
        /// This is a pure function that:
        /// 1. Validates the action against `state`
        /// 2. Updates state in place
        /// 3. Returns the events that were applied
        ///
        /// An empty event list means the action was accepted but changed nothing.
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is not valid for the current state.
        /// The state must not have been modified in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Event; 4]>, Self::Error>;
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use courtbook_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
