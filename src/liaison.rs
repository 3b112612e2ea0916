//! CRUD connectors for named REST tables
//!
//! Each resource table on the server (jobs, workers, anything registered
//! later) gets a [`HandlerLiaison`] with four calls. The registry keys them
//! by a sanitized resource name.

use crate::model::Attributes;
use crate::transport::{parse_response, RestResponse};
use reqwest::blocking::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Connector for one REST table
#[derive(Clone, Debug)]
pub struct HandlerLiaison {
    url: String,
    client: Client,
}

impl HandlerLiaison {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        HandlerLiaison {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Insert a row; fields travel as form data
    pub fn create(&self, data: &Attributes) -> RestResponse {
        debug!(url = %self.url, "liaison POST");
        parse_response(self.client.post(&self.url).form(data).send())
    }

    /// Fetch rows matching the query
    pub fn list(&self, query: &Attributes) -> RestResponse {
        debug!(url = %self.url, "liaison GET");
        parse_response(self.client.get(&self.url).query(query).send())
    }

    /// Update rows; the server reads both selector and changes from the query
    pub fn update(&self, query: &Attributes) -> RestResponse {
        debug!(url = %self.url, "liaison PUT");
        parse_response(self.client.put(&self.url).query(query).send())
    }

    /// Delete rows matching the query
    pub fn delete(&self, query: &Attributes) -> RestResponse {
        debug!(url = %self.url, "liaison DELETE");
        parse_response(self.client.delete(&self.url).query(query).send())
    }
}

/// The conventional method names for a registered resource, e.g.
/// `newSong`/`getSongs`/`updateSongs`/`deleteSongs`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiaisonNames {
    pub create: String,
    pub list: String,
    pub update: String,
    pub delete: String,
}

impl LiaisonNames {
    pub fn for_resource(name: &str) -> Self {
        let title = capitalize(&prepare_liaison_name(name));
        LiaisonNames {
            create: format!("new{}", title),
            list: format!("get{}s", title),
            update: format!("update{}s", title),
            delete: format!("delete{}s", title),
        }
    }
}

/// Make a resource name usable as an identifier
///
/// A leading character outside `[_a-zA-Z]` becomes `_`, then every run of
/// characters outside `[_a-zA-Z0-9]` collapses to one `_`.
pub fn prepare_liaison_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_bad_run = false;
    for (i, c) in name.chars().enumerate() {
        let c = if i == 0 && !(c == '_' || c.is_ascii_alphabetic()) {
            '_'
        } else {
            c
        };
        if c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
            in_bad_run = false;
        } else if !in_bad_run {
            out.push('_');
            in_bad_run = true;
        }
    }
    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Resource name to liaison, one per registered table
#[derive(Clone, Debug)]
pub struct LiaisonRegistry {
    base_url: String,
    client: Client,
    liaisons: BTreeMap<String, HandlerLiaison>,
}

impl LiaisonRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        LiaisonRegistry {
            base_url: base_url.into(),
            client,
            liaisons: BTreeMap::new(),
        }
    }

    /// Register `name` against `path` on the server.
    /// Returns `None` when either is blank.
    pub fn register(&mut self, name: &str, path: &str) -> Option<&HandlerLiaison> {
        if name.trim().is_empty() || path.trim().is_empty() {
            return None;
        }

        let key = prepare_liaison_name(name);
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim().trim_start_matches('/')
        );
        debug!(resource = %key, %url, "registering liaison");

        let liaison = HandlerLiaison::new(self.client.clone(), url);
        self.liaisons.insert(key.clone(), liaison);
        self.liaisons.get(&key)
    }

    pub fn get(&self, name: &str) -> Option<&HandlerLiaison> {
        self.liaisons.get(&prepare_liaison_name(name))
    }

    pub fn unregister(&mut self, name: &str) -> Option<HandlerLiaison> {
        self.liaisons.remove(&prepare_liaison_name(name))
    }

    /// Registered resource names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.liaisons.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.liaisons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.liaisons.is_empty()
    }
}
