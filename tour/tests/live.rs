//! Tests against a running `MongoDB` server.
//!
//! They are ignored by default. Run them with a server in `MONGODB_URI`:
//!
//! ```bash
//! MONGODB_URI=mongodb://localhost:27017 cargo test --test live -- --ignored
//! ```

use std::time::Duration;
use tour::{
    Config, Error, ObservableSubscriber, ReactiveClient, ReactiveCollection,
    model::Ride,
    mongodb::bson::{Document, doc},
    update::decrement_if_at_least,
    workflow,
};

const TIMEOUT: Duration = Duration::from_secs(30);

fn live_config(collection: &str) -> Config {
    Config {
        uri: std::env::var("MONGODB_URI").expect("MONGODB_URI must point at a server"),
        database: "tour_tests".into(),
        collection: format!("{collection}_{}", std::process::id()),
        timeout: TIMEOUT,
        ..Config::default()
    }
}

fn drop_collection(collection: &ReactiveCollection<Document>) {
    let subscriber = ObservableSubscriber::operation();
    collection.drop().subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();
}

fn first(collection: &ReactiveCollection<Document>) -> tour::Result<Document> {
    let subscriber = ObservableSubscriber::operation();
    collection.find(doc! {}).first().subscribe(subscriber.clone());
    subscriber.first_timeout(TIMEOUT)
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn drop_is_idempotent() {
    let config = live_config("drop_twice");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);

    drop_collection(&collection);
    drop_collection(&collection);

    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn inserted_document_is_first() {
    let config = live_config("round_trip");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);
    drop_collection(&collection);

    let document = Ride::rise_of_the_resistance().to_document().unwrap();
    let subscriber = ObservableSubscriber::operation();
    collection
        .insert_one(document.clone())
        .subscribe(subscriber.clone());
    let result = subscriber.first_timeout(TIMEOUT).unwrap();

    assert_eq!(result.inserted_id, tour::mongodb::bson::Bson::Int32(1));
    assert_eq!(first(&collection).unwrap(), document);

    drop_collection(&collection);
    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn empty_collection_has_no_first_document() {
    let config = live_config("empty");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);
    drop_collection(&collection);

    assert!(matches!(first(&collection), Err(Error::NoResult)));

    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn duplicate_id_surfaces_as_error() {
    let config = live_config("duplicate");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);
    drop_collection(&collection);

    let document = doc! { "_id": 7 };
    for expect_error in [false, true] {
        let subscriber = ObservableSubscriber::operation();
        collection
            .insert_one(document.clone())
            .subscribe(subscriber.clone());

        let outcome = subscriber.wait_timeout(TIMEOUT);
        assert_eq!(outcome.is_err(), expect_error);
        if expect_error {
            assert!(matches!(outcome, Err(Error::Mongo(_))));
        }
    }

    drop_collection(&collection);
    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn conditional_update_is_applied_by_the_server() {
    let config = live_config("conditional");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);
    drop_collection(&collection);

    let rides = [Ride::new(1, "a", 9), Ride::new(2, "b", 4), Ride::new(3, "c", 3)];
    let subscriber = ObservableSubscriber::operation();
    collection
        .insert_many(rides.iter().map(|ride| ride.to_document().unwrap()).collect())
        .subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();

    let subscriber = ObservableSubscriber::operation();
    collection
        .update_many(doc! {}, decrement_if_at_least("seats", 4))
        .subscribe(subscriber.clone());
    let result = subscriber.first_timeout(TIMEOUT).unwrap();
    assert_eq!(result.matched_count, 3);
    assert_eq!(result.modified_count, 2);

    let subscriber = ObservableSubscriber::operation();
    collection
        .find(doc! {})
        .sort(doc! { "_id": 1 })
        .subscribe(subscriber.clone());
    let seats = subscriber
        .wait_timeout(TIMEOUT)
        .unwrap()
        .into_iter()
        .map(|document| Ride::from_document(document).unwrap().seats)
        .collect::<Vec<_>>();
    assert_eq!(seats, [5, 0, 3]);

    drop_collection(&collection);
    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn aggregation_previews_without_writing() {
    let config = live_config("preview");
    let client = ReactiveClient::connect(&config).unwrap();
    let collection = client.database(&config.database).collection(&config.collection);
    drop_collection(&collection);

    let subscriber = ObservableSubscriber::operation();
    collection
        .insert_one(Ride::rise_of_the_resistance().to_document().unwrap())
        .subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();

    let subscriber = ObservableSubscriber::operation();
    collection
        .aggregate(decrement_if_at_least("seats", 4).pipeline())
        .subscribe(subscriber.clone());
    let preview = subscriber.first_timeout(TIMEOUT).unwrap();
    assert_eq!(preview.get_i32("seats").unwrap(), 1);

    assert_eq!(first(&collection).unwrap().get_i32("seats").unwrap(), 5);

    let subscriber = ObservableSubscriber::operation();
    collection.count_documents(doc! {}).subscribe(subscriber.clone());
    assert_eq!(subscriber.first_timeout(TIMEOUT).unwrap(), 1);

    drop_collection(&collection);
    client.close();
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn tour_goes_from_five_to_one_and_stays() {
    let config = live_config("tour");

    let report = workflow::run(&config).unwrap();

    assert_eq!(
        report.inserted,
        Ride::rise_of_the_resistance().to_document().unwrap()
    );
    let seats = report.updates.iter().map(|step| step.seats).collect::<Vec<_>>();
    assert_eq!(seats, [Some(1), Some(1)]);
    assert_eq!(report.updates[0].modified, 1);
    assert_eq!(report.updates[1].matched, 1);
    assert_eq!(report.updates[1].modified, 0);
    assert_eq!(report.final_seats(), Some(1));
}

#[test]
#[ignore = "needs a MongoDB server in MONGODB_URI"]
fn typed_collection_round_trip() {
    let config = live_config("typed");
    let client = ReactiveClient::connect(&config).unwrap();

    let subscriber = ObservableSubscriber::operation();
    client.list_database_names().subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();

    let database = client.database(&config.database);
    assert_eq!(database.name(), "tour_tests");
    let rides = database.collection_with_type::<Ride>(&config.collection);

    let subscriber = ObservableSubscriber::operation();
    rides.drop().subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();

    let subscriber = ObservableSubscriber::operation();
    rides
        .insert_many(vec![Ride::new(1, "a", 1), Ride::new(2, "b", 2), Ride::new(3, "c", 3)])
        .subscribe(subscriber.clone());
    assert_eq!(
        subscriber.first_timeout(TIMEOUT).unwrap().inserted_ids.len(),
        3
    );

    let subscriber = ObservableSubscriber::operation();
    rides
        .find(doc! {})
        .sort(doc! { "_id": 1 })
        .skip(1)
        .subscribe(subscriber.clone());
    let ids = subscriber
        .wait_timeout(TIMEOUT)
        .unwrap()
        .into_iter()
        .map(|ride| ride.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, [2, 3]);

    let subscriber = ObservableSubscriber::operation();
    rides
        .delete_many(doc! { "seats": { "$lt": 3 } })
        .subscribe(subscriber.clone());
    assert_eq!(subscriber.first_timeout(TIMEOUT).unwrap().deleted_count, 2);

    let subscriber = ObservableSubscriber::operation();
    rides.drop().subscribe(subscriber.clone());
    subscriber.wait_timeout(TIMEOUT).unwrap();

    client.close();
}
