use crate::Result;
use mongodb::bson::{self, Document};
use serde::{Deserialize, Serialize};

/// The single document the tour works on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    #[serde(rename = "_id")]
    pub id: i32,
    pub item_name: String,
    pub seats: i32,
}

impl Ride {
    pub fn new(id: i32, item_name: impl Into<String>, seats: i32) -> Self {
        Self {
            id,
            item_name: item_name.into(),
            seats,
        }
    }

    pub fn rise_of_the_resistance() -> Self {
        Self::new(1, "Rise of the Resistence", 5)
    }

    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }

    pub fn from_document(document: Document) -> Result<Self> {
        Ok(bson::from_document(document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn document_keeps_field_order_and_id() {
        let document = Ride::rise_of_the_resistance().to_document().unwrap();

        assert_eq!(
            document,
            doc! { "_id": 1, "item_name": "Rise of the Resistence", "seats": 5 }
        );
        assert_eq!(
            document.keys().collect::<Vec<_>>(),
            ["_id", "item_name", "seats"]
        );
    }

    #[test]
    fn reads_back_from_document() {
        let ride = Ride::from_document(doc! { "_id": 1, "item_name": "x", "seats": 1 }).unwrap();

        assert_eq!(ride, Ride::new(1, "x", 1));
    }

    #[test]
    fn missing_seats_is_an_error() {
        assert!(Ride::from_document(doc! { "_id": 1, "item_name": "x" }).is_err());
    }
}
