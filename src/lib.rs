//! `dealsengine` — an in-memory flight-deals index and query engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         dealsengine                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        HTTP front-end (bin/server.rs, http.rs)            │   │
//! │  │      axum routes -> DealsQuery -> DealsStore/TopDstStore  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Query layer (query.rs, aggregate.rs)                │   │
//! │  │   DealsQuery filter  ->  PerDestination/PerDay/PerCountry │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │     Stores (store.rs, topdst.rs, deal.rs)                  │   │
//! │  │   DealsStore { DealInfo table, DealData table }            │   │
//! │  │   TopDstStore { TopDstInfo table, result cache }            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │      Table layer (table.rs, page.rs, lock.rs)              │   │
//! │  │   Table<T>: pages + registry, named-lock-serialized append │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`table`] - fixed-capacity, append-only, time-expiring page tables
//! - [`page`] - named fixed-capacity regions the tables are built from
//! - [`lock`] - named mutual exclusion used to serialize table writers
//! - [`clock`] - time source abstraction (`SystemClock` / `MockClock`)
//! - [`deal`] - `DealInfo` record and derived-field construction
//! - [`query`] - request parameter bundle and per-record filter
//! - [`aggregate`] - the three grouping scan visitors
//! - [`store`] - `DealsStore`, composing the info and data tables
//! - [`topdst`] - the top-destinations counter and its result cache
//! - [`wire`] - `/deals/top` response body encoding
//! - [`codes`] - IATA/country code packing and the country table
//! - [`dates`] - date parsing and weekday-bitmask derivation
//! - [`config`] - sizing and timing constants
//! - [`error`] - crate-wide error type
//!
//! # Quick start
//! ```
//! use dealsengine::{AppState, DealsQueryBuilder};
//!
//! let state = AppState::default();
//! state
//!     .deals
//!     .add_deal("mow", "mad", "ru", "2016-05-01", Some("2016-05-21"), true, 5_000, b"7,7,7")
//!     .unwrap();
//! let query = DealsQueryBuilder::new("mow").destinations("mad").build().unwrap();
//! let results = state.deals.search_per_destination(&query).unwrap();
//! assert_eq!(results[0].info.price, 5_000);
//! ```

pub mod aggregate;
pub mod airports;
pub mod clock;
pub mod codes;
pub mod config;
pub mod dates;
pub mod deal;
pub mod error;
pub mod http;
pub mod lock;
pub mod page;
pub mod query;
pub mod store;
pub mod table;
pub mod topdst;
pub mod wire;

pub use clock::{Clock, MockClock, SystemClock};
pub use deal::{DealInfo, DealWithBlob};
pub use error::{Error, ErrorKind, Result};
pub use lock::NamedLockRegistry;
pub use query::{DealsQuery, DealsQueryBuilder};
pub use store::{DealsStore, DealsStoreStats};
pub use table::{Locator, Table};
pub use topdst::{TopDstInfo, TopDstStore};

use std::sync::Arc;

/// Process-scoped application state, owned by the HTTP front-end and
/// handed to every route handler as `Arc<AppState>` (§9: replaces the
/// original design's `DealsDatabase`/`TopDstDatabase` singletons with an
/// explicit, testable value).
pub struct AppState {
    pub deals: DealsStore,
    pub top_destinations: TopDstStore,
    pub clock: Arc<dyn Clock>,
    /// Flipped by the `/quit` route; the HTTP layer checks this before
    /// accepting new connections and refuses them with `503` during
    /// drain (§7 signal handling).
    pub draining: std::sync::atomic::AtomicBool,
}

impl AppState {
    /// Sizes both stores from [`config::EngineConfig::from_env`], so a
    /// `DEALSENGINE_PAGE_BUDGET` override takes effect for every caller
    /// of this constructor without needing its own config plumbing.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        AppState::with_config(clock, config::EngineConfig::from_env())
    }

    pub fn with_config(clock: Arc<dyn Clock>, config: config::EngineConfig) -> Self {
        let locks = NamedLockRegistry::new();
        AppState {
            deals: DealsStore::with_config(clock.clone(), &locks, &config),
            top_destinations: TopDstStore::with_config(clock.clone(), &locks, &config),
            clock,
            draining: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn begin_drain(&self) {
        self.draining.store(true, std::sync::atomic::Ordering::Release);
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(Arc::new(SystemClock))
    }
}
