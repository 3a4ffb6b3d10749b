// Typed records for the Homebox payloads we touch.
//
// Server responses are decoded into these structs up front; a payload
// missing a required field (or carrying a negative quantity) fails to
// decode instead of surfacing later as a half-filled record. Homebox calls
// tags "labels" on the wire, so the serde names follow the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{id, name}` as embedded in other payloads (an item's location, its
/// labels, a location's parent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A node of the storage hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLocation")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub description: String,
    /// `None` for a root location.
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
}

// Listings carry `parentId`; the detail endpoint embeds `parent: {id, name}`.
#[derive(Deserialize)]
struct RawLocation {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "parentId", default)]
    parent_id: Option<String>,
    #[serde(default)]
    parent: Option<EntityRef>,
}

impl From<RawLocation> for Location {
    fn from(raw: RawLocation) -> Self {
        let parent_id = raw
            .parent_id
            .or(raw.parent.map(|p| p.id))
            .filter(|id| !id.is_empty());
        Location {
            id: raw.id,
            name: raw.name,
            description: raw.description.unwrap_or_default(),
            parent_id,
        }
    }
}

impl Location {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawItem")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub location: Option<EntityRef>,
    #[serde(rename = "labels")]
    pub tags: Vec<EntityRef>,
}

#[derive(Deserialize)]
struct RawItem {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: u32,
    #[serde(default)]
    location: Option<EntityRef>,
    #[serde(default, alias = "tags")]
    labels: Option<Vec<EntityRef>>,
}

impl From<RawItem> for Item {
    fn from(raw: RawItem) -> Self {
        Item {
            id: raw.id,
            name: raw.name,
            description: raw.description.unwrap_or_default(),
            quantity: raw.quantity,
            location: raw.location,
            tags: raw.labels.unwrap_or_default(),
        }
    }
}

impl Item {
    pub fn location_id(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.id.as_str())
    }

    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// Body of `POST /users/login`.
#[derive(Serialize, Debug)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(rename = "stayLoggedIn")]
    pub stay_logged_in: bool,
}

#[derive(Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct LocationCreate {
    pub name: String,
    pub description: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
}

/// Full replacement body for `PUT /locations/{id}`.
#[derive(Serialize, Debug, Clone)]
pub struct LocationUpdate {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ItemCreate {
    pub name: String,
    pub description: String,
    pub quantity: u32,
    #[serde(rename = "locationId")]
    pub location_id: String,
    #[serde(rename = "labelIds")]
    pub tag_ids: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct TagCreate {
    pub name: String,
}

/// Fields of an item to change. `None` leaves the server value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub location_id: Option<String>,
    pub tag_ids: Option<Vec<String>>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ItemUpdate::default()
    }

    /// Whether applying this update to `item` would change anything.
    pub fn changes(&self, item: &Item) -> bool {
        let differs = |new: &Option<String>, old: &str| new.as_deref().is_some_and(|v| v != old);
        differs(&self.name, item.name.as_str())
            || differs(&self.description, item.description.as_str())
            || self.quantity.is_some_and(|q| q != item.quantity)
            || self
                .location_id
                .as_deref()
                .is_some_and(|id| Some(id) != item.location_id())
            || self.tag_ids.as_ref().is_some_and(|ids| {
                let mut new = ids.clone();
                let mut old = item.tag_ids();
                new.sort();
                old.sort();
                new != old
            })
    }

    /// Overlay these fields onto the item document returned by
    /// `GET /items/{id}`, turning it into a `PUT` body. Fields this client
    /// does not model are carried over untouched.
    pub fn merge_into(&self, doc: &mut Map<String, Value>) {
        if let Some(name) = &self.name {
            doc.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(description) = &self.description {
            doc.insert("description".into(), Value::from(description.as_str()));
        }
        if let Some(quantity) = self.quantity {
            doc.insert("quantity".into(), Value::from(quantity));
        }

        let location_id = match &self.location_id {
            Some(id) => Value::from(id.as_str()),
            None => doc
                .get("location")
                .and_then(|l| l.get("id"))
                .cloned()
                .unwrap_or(Value::Null),
        };
        doc.insert("locationId".into(), location_id);

        let tag_ids = match &self.tag_ids {
            Some(ids) => Value::from(ids.clone()),
            None => Value::Array(
                doc.get("labels")
                    .and_then(Value::as_array)
                    .map(|labels| labels.iter().filter_map(|l| l.get("id").cloned()).collect())
                    .unwrap_or_default(),
            ),
        };
        doc.insert("labelIds".into(), tag_ids);
    }
}

/// One page of `GET /items`. `total` is required: paging stops on it.
#[derive(Deserialize, Debug)]
pub struct ItemPage {
    #[serde(default)]
    pub page: usize,
    pub total: usize,
    #[serde(default)]
    pub items: Option<Vec<Item>>,
}
