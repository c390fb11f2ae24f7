// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates short names while the YAML is parsed.

use serde::Deserialize;

use crate::types::ShortName;

pub fn deserialize_short_name_option<'de, D>(deserializer: D) -> Result<Option<ShortName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| ShortName::new(&s).map_err(serde::de::Error::custom))
        .transpose()
}
