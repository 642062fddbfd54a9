// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Querying indexed documents and mapping hits back to relational records.
//!
//! # Architecture
//!
//! ```text
//! Query / Field (expression tree)
//!     ↓
//! SearchQuery ──► RediSearchTranslator → FT.SEARCH syntax
//!     │               (or evaluated directly by the memory backend)
//!     ├─→ SearchResult (cached hits, total)
//!     ├─→ RecordSet (pks in rank order → relational records)
//!     └─→ Paginator → Page
//!
//! AggregateRequest ──► FT.AGGREGATE
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # use search_sync::{Registry, search::Field};
//! # async fn example(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
//! let products = registry.document("ProductDocument")?;
//! let mut query = products
//!     .find(Field::new("vendor_name").eq("Acme") & Field::new("price").ge(10.0))?
//!     .sort_by("-price")?;
//!
//! let result = query.execute(true).await?;
//! println!("{} of {}", result.len(), result.count());
//! # Ok(())
//! # }
//! ```
//!
//! # Query Language (Lucene/RediSearch syntax)
//!
//! ```text
//! @name:anvil                     - Field equals
//! @price:[10 (50]                  - Numeric range, `(` excludes
//! @tags_name:{heavy|steel}         - Tag membership (OR)
//! @name:anvil @price:[10 50]       - Boolean AND
//! (@name:anvil | @name:mallet)     - Boolean OR
//! -(@vendor_name:{Globex})         - Boolean NOT
//! @name:*vil*                      - Wildcard contains
//! @name:anv*                       - Prefix match
//! @name:%anvul%                    - Fuzzy match (Levenshtein)
//! ```

mod aggregate;
mod expression;
mod paginator;
mod query;
mod redis_translator;
mod result;

pub use aggregate::{AggregateRequest, Reducer, Reduction};
pub use expression::{Field, FieldOperator, FieldQuery, Query, QueryNode, QueryValue};
pub use paginator::{Page, Paginator};
pub use query::{QueryOverrides, RecordSet, SearchQuery, SqlParam, SqlQuery};
pub use redis_translator::RediSearchTranslator;
pub use result::SearchResult;
