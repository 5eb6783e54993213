use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Identifier or type tag of a director item.
///
/// The director reports ids as integers, but items are loosely typed and some
/// drivers report strings. Comparison is strict: `5` and `"5"` are different.
/// Integral floats such as `5.0` are the same id as `5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    /// A number outside the `i64` range, or a float with a fraction
    Wide(serde_json::Number),
    Text(String),
}

impl ItemId {
    /// Interpret a JSON value as an id; only numbers and strings qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(n)),
            Value::String(s) => Some(ItemId::Text(s.clone())),
            _ => None,
        }
    }

    fn from_number(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return ItemId::Number(i);
        }
        match n.as_f64() {
            Some(f)
                if n.is_f64()
                    && f.fract() == 0.0
                    && f >= i64::MIN as f64
                    && f < i64::MAX as f64 =>
            {
                ItemId::Number(f as i64)
            }
            _ => ItemId::Wide(n.clone()),
        }
    }

    /// Whether the id counts as set: non-zero, or non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            ItemId::Number(n) => *n != 0,
            // Zero always normalizes to `Number`.
            ItemId::Wide(_) => true,
            ItemId::Text(s) => !s.is_empty(),
        }
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ItemId::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected a number or string id, got {}", value))
        })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{}", n),
            ItemId::Wide(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Number(n)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Text(s.to_string())
    }
}

/// Deserialize an optional id, treating values that cannot be ids as absent.
fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<Option<ItemId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(ItemId::from_json))
}

/// Deserialize a text field that can be any JSON scalar.
///
/// Drivers occasionally report numeric names; they are shown as their
/// string form. Arrays and objects carry no usable text and read as absent.
fn deserialize_string_or_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrScalar;

    impl<'de> de::Visitor<'de> for StringOrScalar {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("any JSON value")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            while seq.next_element::<de::IgnoredAny>()?.is_some() {}
            Ok(None)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            while map.next_entry::<de::IgnoredAny, de::IgnoredAny>()?.is_some() {}
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrScalar)
}

/// One entry of the director's item list for a category.
///
/// Every field is optional on the wire; which ones are required depends on
/// what the item is used for (see [`DeviceDescriptor::classify`]). Fields are
/// decoded leniently so a badly typed field never hides the rest of the item.
///
/// A field that is present but `null`, or unusable (an array id), counts as
/// missing. Covers are therefore always produced with a name, a room and a
/// parent id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    #[serde(rename = "type", default, deserialize_with = "deserialize_lenient_id")]
    pub item_type: Option<ItemId>,

    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: Option<ItemId>,

    #[serde(default, deserialize_with = "deserialize_string_or_scalar")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "deserialize_string_or_scalar")]
    pub room_name: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub parent_id: Option<ItemId>,

    /// Only present on physical devices
    #[serde(default, deserialize_with = "deserialize_string_or_scalar")]
    pub manufacturer: Option<String>,

    /// Only present on physical devices
    #[serde(default, deserialize_with = "deserialize_string_or_scalar")]
    pub model: Option<String>,
}

/// A descriptor that cannot be used, with the reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedDescriptor {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid item: {0}")]
    Invalid(String),
}

/// A descriptor that passed the cover filter and carries every field a cover
/// needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverDescriptor {
    pub id: ItemId,
    pub name: String,
    pub room_name: String,
    pub parent_id: ItemId,
}

/// Outcome of checking a descriptor against the expected cover type.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Cover(CoverDescriptor),
    /// Wrong type or empty id
    Other,
}

impl DeviceDescriptor {
    /// Decode a raw item; anything but a JSON object is malformed.
    pub fn from_value(value: &Value) -> Result<Self, MalformedDescriptor> {
        if !value.is_object() {
            return Err(MalformedDescriptor::Invalid(format!(
                "expected an object, got {}",
                value
            )));
        }
        Self::deserialize(value).map_err(|e| MalformedDescriptor::Invalid(e.to_string()))
    }

    /// Decide whether this descriptor is a cover of `expected_type`.
    ///
    /// `type` and `id` are required on every item. `name`, `roomName` and
    /// `parentId` are only required once the item is known to be a cover.
    pub fn classify(&self, expected_type: &ItemId) -> Result<Classification, MalformedDescriptor> {
        let item_type = self
            .item_type
            .as_ref()
            .ok_or(MalformedDescriptor::MissingField("type"))?;
        let id = self
            .id
            .as_ref()
            .ok_or(MalformedDescriptor::MissingField("id"))?;

        if item_type != expected_type || !id.is_truthy() {
            return Ok(Classification::Other);
        }

        let name = self
            .name
            .clone()
            .ok_or(MalformedDescriptor::MissingField("name"))?;
        let room_name = self
            .room_name
            .clone()
            .ok_or(MalformedDescriptor::MissingField("roomName"))?;
        let parent_id = self
            .parent_id
            .clone()
            .ok_or(MalformedDescriptor::MissingField("parentId"))?;

        Ok(Classification::Cover(CoverDescriptor {
            id: id.clone(),
            name,
            room_name,
            parent_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cover_type() -> ItemId {
        ItemId::Number(7)
    }

    #[test]
    fn test_item_id_truthiness() {
        assert!(ItemId::Number(5).is_truthy());
        assert!(!ItemId::Number(0).is_truthy());
        assert!(ItemId::from("abc").is_truthy());
        assert!(!ItemId::from("").is_truthy());
    }

    #[test]
    fn test_item_id_comparison_is_strict() {
        let number: ItemId = serde_json::from_value(json!(5)).unwrap();
        let text: ItemId = serde_json::from_value(json!("5")).unwrap();
        assert_eq!(number, ItemId::Number(5));
        assert_eq!(text, ItemId::Text("5".to_string()));
        assert_ne!(number, text);
        assert_eq!(number.to_string(), text.to_string());
    }

    #[test]
    fn test_decode_full_item() {
        let descriptor = DeviceDescriptor::from_value(&json!({
            "type": 7,
            "id": 42,
            "name": "Kitchen Shade",
            "roomName": "Kitchen",
            "parentId": 40,
            "manufacturer": "Somfy",
            "model": "RTS",
            "URIs": {}
        }))
        .unwrap();

        assert_eq!(descriptor.item_type, Some(ItemId::Number(7)));
        assert_eq!(descriptor.id, Some(ItemId::Number(42)));
        assert_eq!(descriptor.name.as_deref(), Some("Kitchen Shade"));
        assert_eq!(descriptor.room_name.as_deref(), Some("Kitchen"));
        assert_eq!(descriptor.parent_id, Some(ItemId::Number(40)));
        assert_eq!(descriptor.manufacturer.as_deref(), Some("Somfy"));
    }

    #[test]
    fn test_numeric_name_is_stringified() {
        let descriptor = DeviceDescriptor::from_value(&json!({"name": 12})).unwrap();
        assert_eq!(descriptor.name.as_deref(), Some("12"));
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            DeviceDescriptor::from_value(&json!("not an item")),
            Err(MalformedDescriptor::Invalid(_))
        ));
        assert!(matches!(
            DeviceDescriptor::from_value(&json!([1, 2])),
            Err(MalformedDescriptor::Invalid(_))
        ));
    }

    #[test]
    fn test_badly_typed_fields_do_not_hide_the_item() {
        let descriptor = DeviceDescriptor::from_value(&json!({
            "type": 6,
            "id": 2,
            "name": "Hub",
            "roomName": 12,
            "parentId": {"nested": true},
            "manufacturer": ["Acme"],
            "model": 100
        }))
        .unwrap();

        assert_eq!(descriptor.id, Some(ItemId::Number(2)));
        assert_eq!(descriptor.room_name.as_deref(), Some("12"));
        assert_eq!(descriptor.parent_id, None);
        assert_eq!(descriptor.manufacturer, None);
        assert_eq!(descriptor.model.as_deref(), Some("100"));
    }

    #[test]
    fn test_null_required_field_counts_as_missing() {
        let descriptor = DeviceDescriptor::from_value(&json!({
            "type": 7,
            "id": 5,
            "name": "Shade",
            "roomName": null,
            "parentId": 2
        }))
        .unwrap();

        assert_eq!(
            descriptor.classify(&cover_type()),
            Err(MalformedDescriptor::MissingField("roomName"))
        );
    }

    #[test]
    fn test_wide_and_float_ids() {
        let float = ItemId::from_json(&json!(5.0)).unwrap();
        assert_eq!(float, ItemId::Number(5));

        let large = ItemId::from_json(&json!(18446744073709551615u64)).unwrap();
        assert!(matches!(large, ItemId::Wide(_)));
        assert!(large.is_truthy());
        assert_eq!(large.to_string(), "18446744073709551615");

        let fraction = ItemId::from_json(&json!(5.5)).unwrap();
        assert_ne!(fraction, ItemId::Number(5));
        assert!(fraction.is_truthy());

        assert!(!ItemId::from_json(&json!(0.0)).unwrap().is_truthy());
        assert_eq!(ItemId::from_json(&json!(true)), None);
        assert_eq!(ItemId::from_json(&json!(null)), None);
    }

    #[test]
    fn test_classify_requires_type_and_id() {
        let no_type = DeviceDescriptor {
            id: Some(ItemId::Number(1)),
            ..Default::default()
        };
        assert_eq!(
            no_type.classify(&cover_type()),
            Err(MalformedDescriptor::MissingField("type"))
        );

        let no_id = DeviceDescriptor {
            item_type: Some(ItemId::Number(7)),
            ..Default::default()
        };
        assert_eq!(
            no_id.classify(&cover_type()),
            Err(MalformedDescriptor::MissingField("id"))
        );
    }

    #[test]
    fn test_classify_skips_other_items_without_checking_fields() {
        let parent = DeviceDescriptor {
            item_type: Some(ItemId::Number(6)),
            id: Some(ItemId::Number(2)),
            ..Default::default()
        };
        assert_eq!(parent.classify(&cover_type()), Ok(Classification::Other));

        let zero_id = DeviceDescriptor {
            item_type: Some(ItemId::Number(7)),
            id: Some(ItemId::Number(0)),
            ..Default::default()
        };
        assert_eq!(zero_id.classify(&cover_type()), Ok(Classification::Other));
    }

    #[test]
    fn test_classify_cover_requires_cover_fields() {
        let mut descriptor = DeviceDescriptor {
            item_type: Some(ItemId::Number(7)),
            id: Some(ItemId::Number(5)),
            name: Some("Shade".to_string()),
            room_name: Some("Den".to_string()),
            parent_id: None,
            ..Default::default()
        };
        assert_eq!(
            descriptor.classify(&cover_type()),
            Err(MalformedDescriptor::MissingField("parentId"))
        );

        descriptor.parent_id = Some(ItemId::Number(2));
        assert_eq!(
            descriptor.classify(&cover_type()),
            Ok(Classification::Cover(CoverDescriptor {
                id: ItemId::Number(5),
                name: "Shade".to_string(),
                room_name: "Den".to_string(),
                parent_id: ItemId::Number(2),
            }))
        );
    }
}
