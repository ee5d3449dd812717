use serde::{Deserialize, Deserializer, Serialize};

/// One persona under an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub id: i64,
    #[serde(rename = "memberid", default)]
    pub member_id: i64,
    #[serde(rename = "firstname", default)]
    pub first_name: String,
    #[serde(rename = "lastname", default)]
    pub last_name: String,
}

impl Character {
    pub fn new(id: i64, member_id: i64, first_name: &str, last_name: &str) -> Self {
        Self { id, member_id, first_name: first_name.to_string(), last_name: last_name.to_string() }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The authenticated principal as the provider's userinfo endpoint describes it.
/// Immutable once fetched for a request; only the access token is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    #[serde(default, deserialize_with = "flag_from_bool_or_int")]
    pub confirmed: bool,
    #[serde(rename = "character", default)]
    pub characters: Vec<Character>,
}

impl Identity {
    pub fn character(&self, id: i64) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn owns_character(&self, id: i64) -> bool { self.character(id).is_some() }

    pub fn character_ids(&self) -> Vec<i64> { self.characters.iter().map(|c| c.id).collect() }
}

// Provider sends `confirmed` as 0/1.
fn flag_from_bool_or_int<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag { Bool(bool), Int(i64) }
    Ok(match Option::<Flag>::deserialize(de)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}

// Some storage backends hand the id back as text.
fn id_from_int_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id { Int(i64), Text(String) }
    match Id::deserialize(de)? {
        Id::Int(n) => Ok(n),
        Id::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Persisted contact/display data for one character. `id` is the character id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(deserialize_with = "id_from_int_or_string")]
    pub id: i64,
    #[serde(rename = "username")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

impl Profile {
    /// Profile created lazily the first time a character signs in.
    pub fn default_for(character: &Character) -> Self {
        Self { id: character.id, display_name: character.display_name(), ..Default::default() }
    }
}
