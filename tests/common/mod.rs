// In-memory stand-in for a Homebox server, plugged in through `Transport`.
#![allow(dead_code)]

use homebox_cli::api::{ApiRequest, ApiResponse, Transport};
use homebox_cli::models::{Location, Tag};
use homebox_cli::{Client, Result};
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

pub const USERNAME: &str = "me@example.com";
pub const PASSWORD: &str = "secret";
const TOKEN: &str = "tok-1";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub location_id: String,
    pub tag_ids: Vec<String>,
    /// Fields the client does not model, e.g. `serialNumber`.
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub locations: Vec<Location>,
    pub items: Vec<StoredItem>,
    pub tags: Vec<Tag>,
}

#[derive(Default)]
struct Inner {
    state: State,
    next_id: u64,
    writes: Vec<String>,
    session_valid: bool,
    canned: HashMap<(String, String), (StatusCode, String)>,
}

#[derive(Default)]
pub struct FakeHomebox {
    inner: RefCell<Inner>,
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse {
        status: StatusCode::OK,
        body: body.to_string(),
    }
}

fn status(code: StatusCode, msg: &str) -> ApiResponse {
    ApiResponse {
        status: code,
        body: json!({ "error": msg }).to_string(),
    }
}

fn str_field(body: &Value, key: &str) -> String {
    body.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

impl FakeHomebox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(self, id: &str, name: &str, parent: Option<&str>) -> Self {
        self.inner.borrow_mut().state.locations.push(Location {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent_id: parent.map(Into::into),
        });
        self
    }

    pub fn with_tag(self, id: &str, name: &str) -> Self {
        self.inner.borrow_mut().state.tags.push(Tag {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_item(
        self,
        id: &str,
        name: &str,
        description: &str,
        quantity: u32,
        location_id: &str,
        tag_ids: &[&str],
    ) -> Self {
        self.inner.borrow_mut().state.items.push(StoredItem {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            quantity,
            location_id: location_id.into(),
            tag_ids: tag_ids.iter().map(|t| t.to_string()).collect(),
            extra: Map::new(),
        });
        self
    }

    /// Serve `body` with `code` for `method path` instead of the normal route.
    pub fn respond_with(&self, method: Method, path: &str, code: StatusCode, body: &str) {
        self.inner
            .borrow_mut()
            .canned
            .insert((method.to_string(), path.to_string()), (code, body.to_string()));
    }

    pub fn expire_session(&self) {
        self.inner.borrow_mut().session_valid = false;
    }

    pub fn state(&self) -> State {
        self.inner.borrow().state.clone()
    }

    /// `METHOD /path` of every mutating request served so far.
    pub fn writes(&self) -> Vec<String> {
        self.inner.borrow().writes.clone()
    }

    pub fn location_id(&self, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .state
            .locations
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
    }

    pub fn item(&self, id: &str) -> Option<StoredItem> {
        self.inner.borrow().state.items.iter().find(|i| i.id == id).cloned()
    }
}

impl Inner {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn location_json(&self, loc: &Location) -> Value {
        json!({
            "id": loc.id,
            "name": loc.name,
            "description": loc.description,
            "parentId": loc.parent_id,
        })
    }

    fn item_json(&self, item: &StoredItem) -> Value {
        let location = self
            .state
            .locations
            .iter()
            .find(|l| l.id == item.location_id)
            .map(|l| json!({ "id": l.id, "name": l.name }))
            .unwrap_or(Value::Null);
        let labels: Vec<Value> = item
            .tag_ids
            .iter()
            .filter_map(|id| self.state.tags.iter().find(|t| &t.id == id))
            .map(|t| json!({ "id": t.id, "name": t.name }))
            .collect();
        let mut doc = item.extra.clone();
        doc.insert("id".into(), json!(item.id));
        doc.insert("name".into(), json!(item.name));
        doc.insert("description".into(), json!(item.description));
        doc.insert("quantity".into(), json!(item.quantity));
        doc.insert("location".into(), location);
        doc.insert("labels".into(), Value::Array(labels));
        Value::Object(doc)
    }

    fn route(&mut self, req: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();
        let body = req.body.clone().unwrap_or(Value::Null);
        match (req.method.clone(), segments.as_slice()) {
            (Method::GET, ["locations"]) => {
                let list: Vec<Value> =
                    self.state.locations.iter().map(|l| self.location_json(l)).collect();
                ok(Value::Array(list))
            }
            (Method::GET, ["locations", id]) => {
                match self.state.locations.iter().find(|l| l.id == *id) {
                    Some(loc) => ok(self.location_json(loc)),
                    None => status(StatusCode::NOT_FOUND, "location not found"),
                }
            }
            (Method::POST, ["locations"]) => {
                let parent_id = body.get("parentId").and_then(Value::as_str).map(str::to_string);
                if let Some(parent) = &parent_id {
                    if !self.state.locations.iter().any(|l| &l.id == parent) {
                        return status(StatusCode::NOT_FOUND, "parent not found");
                    }
                }
                let loc = Location {
                    id: self.fresh_id("loc"),
                    name: str_field(&body, "name"),
                    description: str_field(&body, "description"),
                    parent_id,
                };
                let out = self.location_json(&loc);
                self.state.locations.push(loc);
                ok(out)
            }
            (Method::PUT, ["locations", id]) => {
                let Some(idx) = self.state.locations.iter().position(|l| l.id == *id) else {
                    return status(StatusCode::NOT_FOUND, "location not found");
                };
                let loc = Location {
                    id: id.to_string(),
                    name: str_field(&body, "name"),
                    description: str_field(&body, "description"),
                    parent_id: body.get("parentId").and_then(Value::as_str).map(str::to_string),
                };
                let out = self.location_json(&loc);
                self.state.locations[idx] = loc;
                ok(out)
            }
            (Method::DELETE, ["locations", id]) => {
                let before = self.state.locations.len();
                self.state.locations.retain(|l| l.id != *id);
                if self.state.locations.len() == before {
                    status(StatusCode::NOT_FOUND, "location not found")
                } else {
                    ApiResponse { status: StatusCode::NO_CONTENT, body: String::new() }
                }
            }
            (Method::GET, ["items"]) => {
                let param = |key: &str| {
                    req.query
                        .iter()
                        .find(|(k, _)| k == key)
                        .and_then(|(_, v)| v.parse::<usize>().ok())
                };
                let page = param("page").unwrap_or(1).max(1);
                let size = param("pageSize").unwrap_or(50);
                let items: Vec<Value> = self
                    .state
                    .items
                    .iter()
                    .skip((page - 1) * size)
                    .take(size)
                    .map(|i| self.item_json(i))
                    .collect();
                ok(json!({
                    "page": page,
                    "pageSize": size,
                    "total": self.state.items.len(),
                    "items": items,
                }))
            }
            (Method::GET, ["items", id]) => match self.state.items.iter().find(|i| i.id == *id) {
                Some(item) => ok(self.item_json(item)),
                None => status(StatusCode::NOT_FOUND, "item not found"),
            },
            (Method::POST, ["items"]) => {
                let location_id = str_field(&body, "locationId");
                if !self.state.locations.iter().any(|l| l.id == location_id) {
                    return status(StatusCode::NOT_FOUND, "location not found");
                }
                let item = StoredItem {
                    id: self.fresh_id("item"),
                    name: str_field(&body, "name"),
                    description: str_field(&body, "description"),
                    quantity: body.get("quantity").and_then(Value::as_u64).unwrap_or(1) as u32,
                    location_id,
                    tag_ids: string_list(&body, "labelIds"),
                    extra: Map::new(),
                };
                let out = self.item_json(&item);
                self.state.items.push(item);
                ok(out)
            }
            (Method::PUT, ["items", id]) => {
                let Some(idx) = self.state.items.iter().position(|i| i.id == *id) else {
                    return status(StatusCode::NOT_FOUND, "item not found");
                };
                let mut extra = body.as_object().cloned().unwrap_or_default();
                let modelled = [
                    "id", "name", "description", "quantity", "location", "labels", "locationId",
                    "labelIds",
                ];
                for key in modelled {
                    extra.remove(key);
                }
                let item = StoredItem {
                    id: id.to_string(),
                    name: str_field(&body, "name"),
                    description: str_field(&body, "description"),
                    quantity: body.get("quantity").and_then(Value::as_u64).unwrap_or(0) as u32,
                    location_id: str_field(&body, "locationId"),
                    tag_ids: string_list(&body, "labelIds"),
                    extra,
                };
                let out = self.item_json(&item);
                self.state.items[idx] = item;
                ok(out)
            }
            (Method::DELETE, ["items", id]) => {
                let before = self.state.items.len();
                self.state.items.retain(|i| i.id != *id);
                if self.state.items.len() == before {
                    status(StatusCode::NOT_FOUND, "item not found")
                } else {
                    ApiResponse { status: StatusCode::NO_CONTENT, body: String::new() }
                }
            }
            (Method::GET, ["labels"]) => ok(json!(self.state.tags)),
            (Method::POST, ["labels"]) => {
                let tag = Tag {
                    id: self.fresh_id("tag"),
                    name: str_field(&body, "name"),
                };
                let out = json!(tag);
                self.state.tags.push(tag);
                ok(out)
            }
            (Method::DELETE, ["labels", id]) => {
                let before = self.state.tags.len();
                self.state.tags.retain(|t| t.id != *id);
                if self.state.tags.len() == before {
                    status(StatusCode::NOT_FOUND, "label not found")
                } else {
                    ApiResponse { status: StatusCode::NO_CONTENT, body: String::new() }
                }
            }
            _ => status(StatusCode::NOT_FOUND, "no such route"),
        }
    }
}

fn string_list(body: &Value, key: &str) -> Vec<String> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

impl Transport for FakeHomebox {
    fn execute(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let mut inner = self.inner.borrow_mut();

        if req.method == Method::POST && req.path == "/users/login" {
            let body = req.body.clone().unwrap_or(Value::Null);
            if str_field(&body, "username") == USERNAME && str_field(&body, "password") == PASSWORD {
                inner.session_valid = true;
                return Ok(ok(json!({ "token": TOKEN, "expiresAt": "2099-01-01T00:00:00Z" })));
            }
            return Ok(status(StatusCode::UNAUTHORIZED, "invalid credentials"));
        }

        let expected = format!("Bearer {TOKEN}");
        if !inner.session_valid || req.token.as_deref() != Some(expected.as_str()) {
            return Ok(status(StatusCode::UNAUTHORIZED, "not logged in"));
        }

        if let Some((code, body)) = inner
            .canned
            .get(&(req.method.to_string(), req.path.clone()))
            .cloned()
        {
            return Ok(ApiResponse { status: code, body });
        }

        if req.method != Method::GET {
            inner.writes.push(format!("{} {}", req.method, req.path));
        }
        Ok(inner.route(req))
    }
}

/// Logged-in client over a borrowed fake.
pub fn client(fake: &FakeHomebox) -> Client<&FakeHomebox> {
    Client::login(fake, USERNAME, PASSWORD).expect("login against fake")
}

/// Garage/Shelf and Attic, two tags, three items.
pub fn seeded() -> FakeHomebox {
    FakeHomebox::new()
        .with_location("garage", "Garage", None)
        .with_location("shelf", "Shelf", Some("garage"))
        .with_location("attic", "Attic", None)
        .with_tag("t-tools", "tools")
        .with_tag("t-fragile", "fragile")
        .with_item("i1", "Hammer", "Claw hammer", 1, "shelf", &["t-tools"])
        .with_item("i2", "Vase", "", 2, "attic", &["t-fragile", "t-tools"])
        .with_item("i3", "Nails", "", 100, "shelf", &[])
}
