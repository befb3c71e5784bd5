use serde::Deserialize;

/// One dataset record. Optional fields are `None` when absent or blank.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Country {
    pub country: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sound: String,
    #[serde(default, deserialize_with = "non_blank")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub trivia: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub continent: Option<String>,
}

impl Country {
    /// Text handed to the narrator for this country.
    pub fn narration(&self) -> String {
        if self.description.trim().is_empty() {
            self.country.clone()
        } else {
            format!("{}. {}", self.country, self.description.trim())
        }
    }
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}
