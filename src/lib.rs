//! Graphshard: static artifact builder for a model-derivation graph
//!
//! This crate turns one large graph of machine-learning models (nodes are models,
//! edges are "derived from" relationships) into many small, independently
//! fetchable files that a static front end can load on demand:
//!
//! 1. **Load** -- Read a node-link JSON document (plain, `.bz2` or `.gz`) and
//!    validate identifiers and edge endpoints
//! 2. **Partition** -- Group nodes into weakly connected components with a
//!    union-find over the undirected edges
//! 3. **Component artifacts** -- Write one gzip JSON file per component, in parallel
//! 4. **Primary index** -- Map every identifier to its component, with per-component stats
//! 5. **Derived indexes** -- Compact sorted pairs, owner-prefix shards, two-character
//!    alphabetic chunks, and an autocomplete list
//! 6. **Upload** (optional) -- Publish artifacts to an object store with bounded
//!    concurrency, reporting every object that did not make it
//!
//! # Key Modules
//!
//! - [`graph`] -- Graph loading and validation
//! - [`partition`] -- Connected components
//! - [`component`] -- Per-component artifact writer
//! - [`index`] -- Primary identifier-to-component index
//! - [`compact`], [`prefix`], [`alpha`], [`search`] -- Derived index formats
//! - [`keys`] -- Grouping keys and artifact file stems
//! - [`pipeline`] -- Full rebuild orchestration
//! - [`upload`] -- Object store publishing
//! - [`verify`] -- Read-back consistency checks and client-style lookup
//! - [`sample`] -- Connected mini samples for front-end fixtures
//! - [`artifact`] -- Atomic gzip JSON files
//! - [`stats`] -- Thread-safe atomic counters for build metrics
//! - [`config`] -- Constants and build configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Rebuild every artifact from a compressed graph
//! graphshard build -i graph_data.json.bz2 -o public/data --clean
//!
//! # Check that all index formats agree
//! graphshard verify -o public/data
//!
//! # Publish only the alphabetic chunks
//! graphshard upload -o public/data --dest /srv/bucket --selection chunks
//! ```

pub mod alpha;
pub mod artifact;
pub mod compact;
pub mod component;
pub mod config;
pub mod graph;
pub mod index;
pub mod keys;
pub mod models;
pub mod partition;
pub mod pipeline;
pub mod prefix;
pub mod sample;
pub mod search;
pub mod stats;
pub mod upload;
pub mod verify;
