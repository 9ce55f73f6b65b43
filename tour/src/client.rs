//! A `MongoDB` client whose operations are [`Publisher`]s.
//!
//! The client owns a Tokio runtime. Every operation runs there once subscribed, so
//! the thread that issues operations never has to be async itself.

use crate::{Config, Error, Publisher, Result};
use futures_util::{TryFutureExt, TryStreamExt, stream};
use mongodb::{
    Client, Collection, Database,
    bson::Document,
    options::{ClientOptions, UpdateModifications},
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use tokio::runtime::{Builder, Handle, Runtime};

/// Owns the driver client and the runtime its operations run on.
///
/// Release it with [`close`](Self::close). A client that is dropped without being
/// closed is released the same way, so early returns never leak connections.
///
/// Must not be closed or dropped from inside an async context.
pub struct ReactiveClient {
    client: Client,
    hosts: Vec<String>,
    runtime: Runtime,
    closed: bool,
}

impl Debug for ReactiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveClient")
            .field("hosts", &self.hosts)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ReactiveClient {
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .thread_name("tour-driver")
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let uri = config.uri.clone();
        let app_name = config.app_name.clone();

        let (client, hosts) = runtime.block_on(async move {
            let mut options = ClientOptions::parse(uri.as_str()).await?;
            options.app_name = Some(app_name);
            let hosts = options.hosts.iter().map(ToString::to_string).collect::<Vec<_>>();

            Client::with_options(options).map(|client| (client, hosts))
        })?;

        tracing::info!(?hosts, "client created");

        Ok(Self {
            client,
            hosts,
            runtime,
            closed: false,
        })
    }

    /// The seed hosts from the connection string.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn database(&self, name: &str) -> ReactiveDatabase {
        ReactiveDatabase {
            inner: self.client.database(name),
            runtime: self.runtime.handle().clone(),
        }
    }

    /// Lists database names. Useful to check connectivity.
    pub fn list_database_names(&self) -> Publisher<String> {
        let client = self.client.clone();

        Publisher::from_stream(
            self.runtime.handle().clone(),
            "listDatabases",
            stream::once(async move { client.list_database_names().await })
                .map_ok(|names| stream::iter(names.into_iter().map(Ok::<_, Error>)))
                .map_err(Error::from)
                .try_flatten(),
        )
    }

    /// Shuts the driver down and closes every pooled connection.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }

        let client = self.client.clone();
        self.runtime.block_on(async move { client.shutdown().await });

        tracing::info!("client closed");
    }
}

impl Drop for ReactiveClient {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("client dropped without being closed, releasing it");
            self.release();
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReactiveDatabase {
    inner: Database,
    runtime: Handle,
}

impl ReactiveDatabase {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn collection(&self, name: &str) -> ReactiveCollection<Document> {
        self.collection_with_type(name)
    }

    pub fn collection_with_type<T: Send + Sync>(&self, name: &str) -> ReactiveCollection<T> {
        ReactiveCollection {
            inner: self.inner.collection(name),
            runtime: self.runtime.clone(),
        }
    }
}

/// A collection whose operations return [`Publisher`]s.
///
/// ```no_run
/// # fn run(client: &tour::ReactiveClient) -> tour::Result<()> {
/// use tour::{ObservableSubscriber, mongodb::bson::doc};
///
/// let collection = client.database("mydb").collection("test");
///
/// let subscriber = ObservableSubscriber::print_documents();
/// collection.find(doc! {}).first().subscribe(subscriber.clone());
/// let document = subscriber.first()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReactiveCollection<T: Send + Sync> {
    inner: Collection<T>,
    runtime: Handle,
}

impl<T: Send + Sync> Clone for ReactiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> ReactiveCollection<T> {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Drops the collection. Succeeds when the collection does not exist.
    pub fn drop(&self) -> Publisher<()> {
        let collection = self.inner.clone();

        Publisher::from_completion(self.runtime.clone(), "drop", async move {
            collection.drop().await.map_err(Error::from)
        })
    }

    pub fn count_documents(&self, filter: Document) -> Publisher<u64> {
        let collection = self.inner.clone();

        Publisher::from_future(self.runtime.clone(), "countDocuments", async move {
            collection.count_documents(filter).await.map_err(Error::from)
        })
    }

    /// Updates the first document matching `filter`.
    ///
    /// Pass a [`SetStage`](crate::update::SetStage) to have the server evaluate a
    /// conditional expression as part of the same write.
    pub fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Publisher<UpdateResult> {
        let collection = self.inner.clone();
        let update = update.into();

        Publisher::from_future(self.runtime.clone(), "updateOne", async move {
            collection
                .update_one(filter, update)
                .await
                .map_err(Error::from)
        })
    }

    pub fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Publisher<UpdateResult> {
        let collection = self.inner.clone();
        let update = update.into();

        Publisher::from_future(self.runtime.clone(), "updateMany", async move {
            collection
                .update_many(filter, update)
                .await
                .map_err(Error::from)
        })
    }

    pub fn delete_many(&self, filter: Document) -> Publisher<DeleteResult> {
        let collection = self.inner.clone();

        Publisher::from_future(self.runtime.clone(), "deleteMany", async move {
            collection.delete_many(filter).await.map_err(Error::from)
        })
    }

    /// Runs an aggregation pipeline. Nothing is written.
    pub fn aggregate(&self, pipeline: Vec<Document>) -> Publisher<Document> {
        let collection = self.inner.clone();

        let source = async move { collection.aggregate(pipeline).await }
            .map_ok(|cursor| cursor.map_err(Error::from))
            .map_err(Error::from)
            .try_flatten_stream();

        Publisher::from_stream(self.runtime.clone(), "aggregate", source)
    }
}

impl<T: Serialize + Send + Sync + 'static> ReactiveCollection<T> {
    pub fn insert_one(&self, document: T) -> Publisher<InsertOneResult> {
        let collection = self.inner.clone();

        Publisher::from_future(self.runtime.clone(), "insertOne", async move {
            collection.insert_one(document).await.map_err(Error::from)
        })
    }

    pub fn insert_many(&self, documents: Vec<T>) -> Publisher<InsertManyResult> {
        let collection = self.inner.clone();

        Publisher::from_future(self.runtime.clone(), "insertMany", async move {
            collection.insert_many(documents).await.map_err(Error::from)
        })
    }
}

impl<T: DeserializeOwned + Unpin + Send + Sync + 'static> ReactiveCollection<T> {
    /// Finds the documents matching `filter`. Nothing is sent until the returned
    /// publisher is subscribed.
    pub fn find(&self, filter: Document) -> FindPublisher<T> {
        FindPublisher {
            collection: self.clone(),
            filter,
            sort: None,
            skip: None,
            limit: None,
        }
    }
}

#[derive(Debug)]
#[must_use = "find publishers do nothing unless subscribed"]
pub struct FindPublisher<T: Send + Sync> {
    collection: ReactiveCollection<T>,
    filter: Document,
    sort: Option<Document>,
    skip: Option<u64>,
    limit: Option<i64>,
}

impl<T: DeserializeOwned + Unpin + Send + Sync + 'static> FindPublisher<T> {
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Emits at most the first matching document.
    pub fn first(self) -> Publisher<T> {
        self.limit(1).into_publisher().first()
    }

    pub fn into_publisher(self) -> Publisher<T> {
        let Self {
            collection,
            filter,
            sort,
            skip,
            limit,
        } = self;
        let runtime = collection.runtime.clone();
        let inner = collection.inner;

        let source = async move {
            let mut query = inner.find(filter);

            if let Some(sort) = sort {
                query = query.sort(sort);
            }

            if let Some(skip) = skip {
                query = query.skip(skip);
            }

            if let Some(limit) = limit {
                query = query.limit(limit);
            }

            query.await
        }
        .map_ok(|cursor| cursor.map_err(Error::from))
        .map_err(Error::from)
        .try_flatten_stream();

        Publisher::from_stream(runtime, "find", source)
    }

    pub fn subscribe<S: crate::Subscriber<T>>(self, subscriber: S) {
        self.into_publisher().subscribe(subscriber);
    }
}
