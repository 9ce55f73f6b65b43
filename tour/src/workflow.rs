//! The conditional update tour.
//!
//! Inserts one ride, then twice asks the server to remove four seats only if at
//! least four are left. The first attempt takes the ride from 5 seats to 1, the
//! second leaves it at 1. Every operation is awaited before the next is issued.

use crate::{
    Config, ObservableSubscriber, ReactiveClient, ReactiveCollection, Result,
    model::Ride,
    update::{SetStage, decrement_if_at_least},
};
use mongodb::bson::{Bson, Document, doc};
use std::time::Duration;

pub const SEATS_FIELD: &str = "seats";

pub const SEATS_REMOVED: i32 = 4;

pub const UPDATE_ATTEMPTS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateStep {
    pub matched: u64,
    pub modified: u64,
    /// `None` when the document has no integer seat count after the update.
    pub seats: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TourReport {
    pub inserted: Document,
    pub updates: Vec<UpdateStep>,
}

impl TourReport {
    pub fn final_seats(&self) -> Option<i32> {
        self.updates.last().and_then(|step| step.seats)
    }
}

/// Connects, runs the tour and closes the client.
///
/// The client is released even when a step fails.
pub fn run(config: &Config) -> Result<TourReport> {
    let client = ReactiveClient::connect(config)?;

    let report = run_with_client(&client, config)?;

    client.close();

    Ok(report)
}

pub fn run_with_client(client: &ReactiveClient, config: &Config) -> Result<TourReport> {
    let collection = client
        .database(&config.database)
        .collection(&config.collection);
    let timeout = config.timeout;

    tracing::info!(
        database = %config.database,
        collection = %config.collection,
        "starting conditional update tour"
    );

    drop_collection(&collection, timeout)?;

    println!("\n*** Inserting test record ***");
    let ride = Ride::rise_of_the_resistance();
    let subscriber = ObservableSubscriber::operation();
    collection
        .insert_one(ride.to_document()?)
        .subscribe(subscriber.clone());
    let inserted_id = subscriber.first_timeout(timeout)?.inserted_id;
    tracing::debug!(%inserted_id, "ride inserted");

    println!("\n*** Inserted document ***");
    let inserted = print_first(&collection, timeout)?;

    let stage = decrement_if_at_least(SEATS_FIELD, SEATS_REMOVED);
    let filter = doc! { "_id": ride.id };
    let mut current = inserted.clone();
    let mut updates = Vec::with_capacity(UPDATE_ATTEMPTS);

    for attempt in 1..=UPDATE_ATTEMPTS {
        let step = conditional_update(&collection, &filter, &stage, &mut current, timeout)?;
        tracing::info!(
            attempt,
            matched = step.matched,
            modified = step.modified,
            seats = ?step.seats,
            "conditional update applied"
        );
        updates.push(step);
    }

    println!("\n*** Clean up: drop() ***");
    drop_collection(&collection, timeout)?;

    Ok(TourReport { inserted, updates })
}

fn drop_collection(collection: &ReactiveCollection<Document>, timeout: Duration) -> Result<()> {
    let subscriber = ObservableSubscriber::operation();
    collection.drop().subscribe(subscriber.clone());
    subscriber.wait_timeout(timeout)?;

    tracing::debug!(collection = collection.name(), "collection dropped");

    Ok(())
}

fn print_first(collection: &ReactiveCollection<Document>, timeout: Duration) -> Result<Document> {
    let subscriber = ObservableSubscriber::print_documents();
    collection.find(doc! {}).first().subscribe(subscriber.clone());

    subscriber.first_timeout(timeout)
}

fn conditional_update(
    collection: &ReactiveCollection<Document>,
    filter: &Document,
    stage: &SetStage,
    current: &mut Document,
    timeout: Duration,
) -> Result<UpdateStep> {
    let predicted = predict_seats(stage, current);

    println!("\n*** Conditional update, removing {SEATS_REMOVED} seats ***");
    let subscriber = ObservableSubscriber::print("Update Result: {}");
    collection
        .update_one(filter.clone(), stage.clone())
        .subscribe(subscriber.clone());
    let outcome = subscriber.first_timeout(timeout)?;

    println!("\n*** Record after update ***");
    let document = print_first(collection, timeout)?;
    let seats = document.get_i32(SEATS_FIELD).ok();

    if let Some(predicted) = predicted {
        if Some(&predicted) != document.get(SEATS_FIELD) {
            tracing::warn!(
                %predicted,
                ?seats,
                "server result differs from local prediction"
            );
        }
    }

    *current = document;

    Ok(UpdateStep {
        matched: outcome.matched_count,
        modified: outcome.modified_count,
        seats,
    })
}

/// The seat count the server is expected to write, when it can be computed locally.
fn predict_seats(stage: &SetStage, current: &Document) -> Option<Bson> {
    match stage.preview(current) {
        Ok(mut predicted) => predicted.remove(SEATS_FIELD),
        Err(error) => {
            tracing::debug!(%error, "no local prediction, the server decides alone");
            None
        }
    }
}
