//! Arforge DB Library
//!
//! PostgreSQL persistence for submission records. The repository is the only
//! component that touches the `submissions` table; every query is scoped to
//! the owning principal, and terminal status transitions are guarded at the
//! statement level so the state machine holds even against a concurrent
//! writer bug.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE submissions (
//!     id UUID PRIMARY KEY,
//!     owner TEXT NOT NULL,
//!     title TEXT NOT NULL,
//!     description TEXT,
//!     image_key TEXT,
//!     video_key TEXT,
//!     marker_key TEXT,
//!     status TEXT NOT NULL DEFAULT 'processing',
//!     error_detail TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE INDEX submissions_owner_idx ON submissions (owner, created_at DESC);
//! ```

pub mod submissions;

pub use submissions::{RecordError, SubmissionRepository};
