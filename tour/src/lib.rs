//! Reactive `MongoDB` operations observed through blocking subscribers.
//!
//! Every collection operation returns a [`Publisher`]. Subscribing starts it on the
//! client's runtime; an [`ObservableSubscriber`] collects what it emits and lets a
//! plain thread block until the operation has terminated.
//!
//! ## Example
//!
//! ```no_run
//! use tour::{Config, ObservableSubscriber, ReactiveClient, mongodb::bson::doc};
//!
//! # fn main() -> tour::Result<()> {
//! let client = ReactiveClient::connect(&Config::default())?;
//! let collection = client.database("mydb").collection("test");
//!
//! // Remove four seats, but only if at least four are left.
//! let update = tour::set! {
//!     seats: if seats >= 4 { seats - 4 } else { seats },
//! };
//!
//! let subscriber = ObservableSubscriber::print("Update Result: {}");
//! collection
//!     .update_one(doc! { "_id": 1 }, update)
//!     .subscribe(subscriber.clone());
//! let result = subscriber.first()?;
//!
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! The [`workflow`] module runs the complete conditional update tour.

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate self as tour;

pub mod client;
pub mod config;
mod error;
pub mod model;
pub mod publisher;
pub mod subscriber;
pub mod update;
pub mod workflow;

pub use client::{FindPublisher, ReactiveClient, ReactiveCollection, ReactiveDatabase};
pub use config::Config;
pub use error::{Error, Result};
pub use mongodb;
pub use publisher::{Publisher, Subscription};
pub use subscriber::{ObservableSubscriber, Subscriber};
pub use tour_macros::{expr, set};
