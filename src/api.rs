// API client module: a small blocking client for the Homebox REST API.
//
// `Client` owns one authenticated session and exposes typed CRUD calls for
// locations, items and tags plus the path-aware helpers built on them.
// The wire itself sits behind the `Transport` trait so the same client can
// run against reqwest or an in-memory server in tests.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    Item, ItemCreate, ItemPage, ItemUpdate, Location, LocationCreate, LocationUpdate,
    LoginRequest, LoginResponse, Tag, TagCreate,
};
use crate::paths::LocationTree;
use reqwest::blocking;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

const ITEMS_PAGE_SIZE: usize = 100;

/// One request, relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            token: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::validation(format!("encoding request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Anything that can carry an `ApiRequest` to the server and bring back
/// the raw response. Status handling is the client's job, not the
/// transport's.
pub trait Transport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        (**self).execute(request)
    }
}

/// reqwest-backed transport. Cookies set by the server are kept for the
/// lifetime of the transport.
pub struct HttpTransport {
    client: blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = blocking::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(concat!("homebox-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpTransport {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.query)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &request.token {
            let value = HeaderValue::from_str(token)
                .map_err(|_| Error::Auth("session token is not a valid header value".into()))?;
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let res = builder.send()?;
        let status = res.status();
        let body = res.text()?;
        Ok(ApiResponse { status, body })
    }
}

/// Where `create_location` should hang the new location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Id(String),
    /// A `/`-separated path (or bare name), resolved against the current
    /// listing.
    Path(String),
}

/// Result of `ensure_location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured {
    Created(Location),
    Existing(Location),
}

impl Ensured {
    pub fn location(&self) -> &Location {
        match self {
            Ensured::Created(l) | Ensured::Existing(l) => l,
        }
    }
}

/// Authenticated Homebox session.
pub struct Client<T = HttpTransport> {
    transport: T,
    token: String,
}

impl Client<HttpTransport> {
    /// Build the reqwest transport from `config` and log in.
    pub fn connect(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Client::login(transport, &config.username, &config.password)
    }
}

impl<T: Transport> Client<T> {
    /// Log in over `transport` and keep the session token.
    pub fn login(transport: T, username: &str, password: &str) -> Result<Self> {
        let request = ApiRequest::new(Method::POST, "/users/login").json(&LoginRequest {
            username,
            password,
            stay_logged_in: false,
        })?;
        let res = transport.execute(&request)?;
        if matches!(res.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(Error::Auth(format!("login rejected for '{username}' ({})", res.status)));
        }
        let res = check(&request, res)?;
        let login: LoginResponse = decode(&res, "login response")?;
        if login.token.is_empty() {
            return Err(Error::Auth("server returned an empty session token".into()));
        }
        let token = if login.token.starts_with("Bearer ") {
            login.token
        } else {
            format!("Bearer {}", login.token)
        };
        info!(username, "logged in");
        Ok(Client { transport, token })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.token = Some(self.token.clone());
        debug!(method = %request.method, path = %request.path, "request");
        let res = self.transport.execute(&request)?;
        if matches!(res.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(Error::Auth(format!(
                "{} {} was refused ({}); the session may have expired",
                request.method, request.path, res.status
            )));
        }
        check(&request, res)
    }

    // ---- locations -------------------------------------------------------

    pub fn get_locations(&self) -> Result<Vec<Location>> {
        let res = self.send(ApiRequest::new(Method::GET, "/locations"))?;
        decode(&res, "location list")
    }

    pub fn get_location(&self, id: &str) -> Result<Location> {
        let res = self
            .send(ApiRequest::new(Method::GET, format!("/locations/{id}")))
            .map_err(|e| e.or_not_found("location", id))?;
        decode(&res, "location")
    }

    /// Fetch all locations and index them for path work.
    pub fn location_tree(&self) -> Result<LocationTree> {
        Ok(LocationTree::new(self.get_locations()?))
    }

    /// Create a location under `parent` (a root when `None`).
    ///
    /// A `ParentRef::Path` is resolved against a fresh listing first; an
    /// unknown parent fails with a not-found error before anything is sent.
    pub fn create_location(
        &self,
        name: &str,
        description: &str,
        parent: Option<&ParentRef>,
    ) -> Result<Location> {
        let parent_id = match parent {
            None => None,
            Some(ParentRef::Id(id)) => Some(id.clone()),
            Some(ParentRef::Path(path)) => Some(self.location_tree()?.resolve(path, false)?.id.clone()),
        };
        self.create_location_with_parent_id(name, description, parent_id)
    }

    pub fn create_location_with_parent_id(
        &self,
        name: &str,
        description: &str,
        parent_id: Option<String>,
    ) -> Result<Location> {
        validate_name(name, "location")?;
        let body = LocationCreate {
            name: name.to_string(),
            description: description.to_string(),
            parent_id: parent_id.clone(),
        };
        let res = self
            .send(ApiRequest::new(Method::POST, "/locations").json(&body)?)
            .map_err(|e| match &parent_id {
                Some(id) => e.or_not_found("location", id),
                None => e,
            })?;
        let mut created: Location = decode(&res, "created location")?;
        // Create responses do not always echo the parent.
        if created.parent_id.is_none() {
            created.parent_id = parent_id;
        }
        info!(id = %created.id, name, parent = ?created.parent_id, "created location");
        Ok(created)
    }

    /// Like `create_location`, but hand back the existing location when one
    /// with the same name already sits under the resolved parent.
    pub fn ensure_location(
        &self,
        name: &str,
        description: &str,
        parent: Option<&ParentRef>,
    ) -> Result<Ensured> {
        let tree = self.location_tree()?;
        let parent_id = match parent {
            None => None,
            Some(ParentRef::Id(id)) => {
                if tree.get(id).is_none() {
                    return Err(Error::not_found("location", id.as_str()));
                }
                Some(id.clone())
            }
            Some(ParentRef::Path(path)) => Some(tree.resolve(path, false)?.id.clone()),
        };
        if let Some(existing) = tree.child(parent_id.as_deref(), name, false) {
            info!(id = %existing.id, name, "location already exists, skipping");
            return Ok(Ensured::Existing(existing.clone()));
        }
        self.create_location_with_parent_id(name, description, parent_id)
            .map(Ensured::Created)
    }

    pub fn update_location(&self, update: &LocationUpdate) -> Result<Location> {
        validate_name(&update.name, "location")?;
        let res = self
            .send(ApiRequest::new(Method::PUT, format!("/locations/{}", update.id)).json(update)?)
            .map_err(|e| e.or_not_found("location", &update.id))?;
        info!(id = %update.id, "updated location");
        decode(&res, "updated location")
    }

    pub fn delete_location(&self, id: &str) -> Result<()> {
        self.send(ApiRequest::new(Method::DELETE, format!("/locations/{id}")))
            .map_err(|e| e.or_not_found("location", id))?;
        info!(id, "deleted location");
        Ok(())
    }

    /// Locations whose name contains `term`. Each call lists the server
    /// afresh; the returned iterator yields matches in listing order.
    pub fn search_location(
        &self,
        term: &str,
        ignore_case: bool,
    ) -> Result<impl Iterator<Item = Location>> {
        let folded = term.to_lowercase();
        let term = term.to_string();
        Ok(self
            .get_locations()?
            .into_iter()
            .filter(move |loc| {
                if ignore_case {
                    loc.name.to_lowercase().contains(&folded)
                } else {
                    loc.name.contains(&term)
                }
            }))
    }

    // ---- items -----------------------------------------------------------

    /// Every item, following pagination until the reported total is reached.
    pub fn get_items(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let res = self.send(
                ApiRequest::new(Method::GET, "/items")
                    .query("page", page)
                    .query("pageSize", ITEMS_PAGE_SIZE),
            )?;
            let batch: ItemPage = decode(&res, "item page")?;
            let got = batch.items.unwrap_or_default();
            let done = got.is_empty() || items.len() + got.len() >= batch.total;
            items.extend(got);
            if done {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    pub fn get_item(&self, id: &str) -> Result<Item> {
        let res = self
            .send(ApiRequest::new(Method::GET, format!("/items/{id}")))
            .map_err(|e| e.or_not_found("item", id))?;
        decode(&res, "item")
    }

    pub fn create_item(&self, item: &ItemCreate) -> Result<Item> {
        validate_name(&item.name, "item")?;
        let res = self
            .send(ApiRequest::new(Method::POST, "/items").json(item)?)
            .map_err(|e| e.or_not_found("location", &item.location_id))?;
        let created: Item = decode(&res, "created item")?;
        info!(id = %created.id, name = %created.name, "created item");
        Ok(created)
    }

    /// Partial update: fetch the current document, overlay `fields`, and
    /// write it back.
    pub fn update_item(&self, id: &str, fields: &ItemUpdate) -> Result<Item> {
        if let Some(name) = &fields.name {
            validate_name(name, "item")?;
        }
        let res = self
            .send(ApiRequest::new(Method::GET, format!("/items/{id}")))
            .map_err(|e| e.or_not_found("item", id))?;
        let mut doc = match decode::<Value>(&res, "item")? {
            Value::Object(map) => map,
            _ => return Err(Error::validation(format!("item '{id}' is not a JSON object"))),
        };
        fields.merge_into(&mut doc);
        doc.insert("id".into(), Value::from(id));

        let res = self
            .send(ApiRequest::new(Method::PUT, format!("/items/{id}")).json(&doc)?)
            .map_err(|e| e.or_not_found("item", id))?;
        info!(id, "updated item");
        decode(&res, "updated item")
    }

    pub fn delete_item(&self, id: &str) -> Result<()> {
        self.send(ApiRequest::new(Method::DELETE, format!("/items/{id}")))
            .map_err(|e| e.or_not_found("item", id))?;
        info!(id, "deleted item");
        Ok(())
    }

    // ---- tags ------------------------------------------------------------

    pub fn get_tags(&self) -> Result<Vec<Tag>> {
        let res = self.send(ApiRequest::new(Method::GET, "/labels"))?;
        decode(&res, "tag list")
    }

    pub fn create_tag(&self, name: &str) -> Result<Tag> {
        validate_name(name, "tag")?;
        let body = TagCreate {
            name: name.to_string(),
        };
        let res = self.send(ApiRequest::new(Method::POST, "/labels").json(&body)?)?;
        let tag: Tag = decode(&res, "created tag")?;
        info!(id = %tag.id, name, "created tag");
        Ok(tag)
    }

    pub fn delete_tag(&self, id: &str) -> Result<()> {
        self.send(ApiRequest::new(Method::DELETE, format!("/labels/{id}")))
            .map_err(|e| e.or_not_found("tag", id))?;
        info!(id, "deleted tag");
        Ok(())
    }
}

fn check(request: &ApiRequest, res: ApiResponse) -> Result<ApiResponse> {
    if res.status.is_success() {
        return Ok(res);
    }
    Err(Error::Status {
        method: request.method.to_string(),
        path: request.path.clone(),
        status: res.status,
        body: res.body,
    })
}

fn decode<D: DeserializeOwned>(res: &ApiResponse, what: &str) -> Result<D> {
    serde_json::from_str(&res.body).map_err(|e| Error::validation(format!("malformed {what}: {e}")))
}

fn validate_name(name: &str, kind: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("{kind} name must not be empty")));
    }
    Ok(())
}
