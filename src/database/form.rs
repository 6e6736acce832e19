use std::{collections::HashMap, str::FromStr};

use serde_json::Value;

use super::error::TypeError;

pub type FormData = HashMap<String, Value>;

/// Loosely typed request body, as handed over by the request layer.
#[derive(Debug, Clone, Default)]
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn from_json(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(map) => Ok(Self {
                inner: map.into_iter().collect(),
            }),
            _ => Err(TypeError::new("Expected a JSON object")),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Accepts JSON numbers as well as numeric strings.
    pub fn get_number<T>(&self, key: &str) -> Result<T, TypeError>
    where
        T: FromStr,
    {
        match self.inner.get(key) {
            Some(value) => number_from_value(value),
            None => Err(TypeError::new("This field is required")),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<String, TypeError> {
        match self.inner.get(key) {
            Some(value) => match value.as_str() {
                Some(v) => Ok(v.to_string()),
                None => Err(TypeError::new("Expected a string")),
            },
            None => Err(TypeError::new("This field is required")),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<Vec<Value>, TypeError> {
        match self.inner.get(key) {
            Some(Value::Array(values)) => Ok(values.to_owned()),
            Some(_) => Err(TypeError::new("Expected a list")),
            None => Err(TypeError::new("This field is required")),
        }
    }
}

pub fn number_from_value<T>(value: &Value) -> Result<T, TypeError>
where
    T: FromStr,
{
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(TypeError::new("Expected a number")),
    };

    raw.parse()
        .map_err(|_e| TypeError::new("A valid integer is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_numbers_from_numbers_and_strings() {
        let form = Form::from_json(json!({ "a": 5, "b": "12", "c": "x", "d": 1.5 })).unwrap();

        assert_eq!(form.get_number::<i64>("a").unwrap(), 5);
        assert_eq!(form.get_number::<i16>("b").unwrap(), 12);
        assert!(form.get_number::<i64>("c").is_err());
        assert!(form.get_number::<i64>("d").is_err());
        assert!(form.get_number::<i64>("missing").is_err());
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(Form::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn lists_and_strings_are_type_checked() {
        let form = Form::from_json(json!({ "tags": [1, 2], "name": 3 })).unwrap();

        assert_eq!(form.get_list("tags").unwrap().len(), 2);
        assert!(form.get_list("name").is_err());
        assert!(form.get_str("name").is_err());
        assert_eq!(form.get_str("tags").unwrap_err().info(), "Expected a string");
    }
}
