//! # tds74-client
//!
//! Async SQL Server client over the TDS 7.4 protocol: a [`Session`] connects
//! over TCP, upgrades to TLS when the server asks for it, authenticates with
//! a LOGIN7 exchange and then executes SQL batches and stored procedure
//! calls inside implicit transactions.
//!
//! ```rust,ignore
//! use tds74_client::{Config, Session};
//!
//! let config = Config::new("localhost")
//!     .credentials("sa", "password")
//!     .database("test");
//! let mut session = Session::connect(config).await?;
//!
//! let result = session.execute("SELECT 1 AS one").await?;
//! assert_eq!(result.rows[0].get(0), Some(&tds74_client::Value::Int(1)));
//! session.commit().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod response;
pub mod row;

pub use client::Session;
pub use config::{Config, EncryptMode};
pub use error::{Error, Result};
pub use row::{Column, ProcResult, QueryResult, Row};

pub use tds74_protocol::IsolationLevel;
pub use tds74_types::{Param, Value};

pub use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
