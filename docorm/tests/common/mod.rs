#![allow(dead_code)]

use docorm::{memory::InMemoryStore, prelude::*};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(path_id = "users", path = "users")]
#[relation(name = "posts", kind = "has_many", target = "posts", key = "author_id")]
#[relation(name = "profile", kind = "has_one", target = "profiles", key = "user_id")]
pub struct User {
    #[model(id)]
    #[serde(skip)]
    pub id: Option<String>,
    #[model(alias = "full_name", required, text_index)]
    pub name: String,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(path_id = "posts", path = "posts")]
#[relation(name = "author", kind = "belongs_to", target = "users", key = "author_id")]
#[relation(name = "tags", kind = "belongs_to_many", target = "tags", key = "tag_ids")]
pub struct Post {
    #[model(id)]
    #[serde(skip)]
    pub id: Option<String>,
    pub title: String,
    pub author_id: String,
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(path_id = "profiles", path = "profiles")]
pub struct Profile {
    #[model(id)]
    #[serde(skip)]
    pub id: Option<String>,
    pub user_id: String,
    #[model(required)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(path_id = "tags", path = "tags")]
pub struct Tag {
    #[model(id)]
    #[serde(skip)]
    pub id: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(path_id = "members", path = "orgs/{org_id}/members")]
pub struct Member {
    #[model(id)]
    #[serde(skip)]
    pub id: Option<String>,
    #[model(path_param)]
    #[serde(skip)]
    pub org_id: String,
    pub role: String,
}

pub fn user(id: &str, name: &str, age: i32) -> User {
    User { id: Some(id.to_string()), name: name.to_string(), age: Some(age) }
}

/// A fresh store with a connection of the given flavour.
pub fn connect(flavour: HandleFlavour) -> (InMemoryStore, Arc<Connection>) {
    connect_with(flavour, ConnectionOptions::new())
}

pub fn connect_with(flavour: HandleFlavour, options: ConnectionOptions) -> (InMemoryStore, Arc<Connection>) {
    let store = InMemoryStore::new();
    let registry = ConnectionRegistry::new();
    let connection = registry
        .init_connection_with(Arc::new(store.handle(flavour)), None, options)
        .unwrap();
    (store, connection)
}

/// Saves Ann (17), Bob (30), Joe (42) and Zoe (30) through `connection`.
pub async fn seed_users(connection: &Arc<Connection>) {
    for (id, name, age) in [("u1", "Ann", 17), ("u2", "Bob", 30), ("u3", "Joe", 42), ("u4", "Zoe", 30)] {
        user(id, name, age).save(connection).await.unwrap();
    }
}

pub fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|user| user.name.as_str()).collect()
}

pub fn sorted_names(users: &[User]) -> Vec<&str> {
    let mut names = names(users);
    names.sort();
    names
}
