use axum::{extract::rejection::JsonRejection, Json};
use serde::de::DeserializeOwned;

use crate::error::UserError;

/// The raw query parameters of a request, in order of appearance.
/// Repeated keys are kept, such that arrays can be detected.
pub type QueryParameters = Vec<(String, String)>;

/// Get the value of a query parameter that must be a single value.
///
/// A parameter is an array if it occurs more than once or its value contains a comma.
/// Arrays are reported as [`UserError::ArrayParameter`] with the given `array_name`.
/// Empty values count as absent.
pub fn scalar_query_parameter<'parameters>(
    parameters: &'parameters [(String, String)],
    key: &str,
    array_name: &'static str,
) -> Result<Option<&'parameters str>, UserError> {
    let mut values = parameters
        .iter()
        .filter(|(parameter_key, _)| parameter_key == key)
        .map(|(_, value)| value.as_str());

    let value = values.next();
    if values.next().is_some() || value.is_some_and(|value| value.contains(',')) {
        return Err(UserError::ArrayParameter { name: array_name });
    }

    Ok(value.filter(|value| !value.is_empty()))
}

/// Like [`scalar_query_parameter`], but parses the value as id.
pub fn id_query_parameter(
    parameters: &[(String, String)],
    key: &'static str,
    array_name: &'static str,
) -> Result<Option<i64>, UserError> {
    scalar_query_parameter(parameters, key, array_name)?
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| UserError::MalformedParameter { name: key })
        })
        .transpose()
}

/// Like [`id_query_parameter`], but the parameter is required.
pub fn required_id_query_parameter(
    parameters: &[(String, String)],
    key: &'static str,
    array_name: &'static str,
) -> Result<i64, UserError> {
    id_query_parameter(parameters, key, array_name)?
        .ok_or(UserError::MissingParameter { name: key })
}

/// Turn a rejected JSON body into a bad request.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, UserError> {
    body.map(|Json(body)| body)
        .map_err(|rejection| UserError::MalformedBody {
            reason: rejection.body_text(),
        })
}

/// Decode a JSON object whose listed fields must not be arrays.
pub fn json_body_without_arrays<T: DeserializeOwned>(
    body: Result<Json<serde_json::Value>, JsonRejection>,
    scalar_fields: &[&'static str],
) -> Result<T, UserError> {
    let body = json_body(body)?;

    if let Some(field) = scalar_fields
        .iter()
        .find(|field| body.get(**field).is_some_and(serde_json::Value::is_array))
    {
        return Err(UserError::ArrayParameter { name: *field });
    }

    serde_json::from_value(body).map_err(|error| UserError::MalformedBody {
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use serde::Deserialize;

    use super::{
        id_query_parameter, json_body_without_arrays, required_id_query_parameter,
        scalar_query_parameter,
    };
    use crate::error::UserError;

    fn parameters(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_single_value() {
        let parameters = parameters(&[("bookId", "12"), ("other", "x")]);
        assert_eq!(
            scalar_query_parameter(&parameters, "bookId", "siteId"),
            Ok(Some("12"))
        );
        assert_eq!(
            id_query_parameter(&parameters, "bookId", "siteId"),
            Ok(Some(12))
        );
    }

    #[test]
    fn test_absent_and_empty_values() {
        assert_eq!(
            id_query_parameter(&parameters(&[]), "bookId", "siteId"),
            Ok(None)
        );
        assert_eq!(
            id_query_parameter(&parameters(&[("bookId", "")]), "bookId", "siteId"),
            Ok(None)
        );
        assert_eq!(
            required_id_query_parameter(&parameters(&[]), "wordId", "wordId"),
            Err(UserError::MissingParameter { name: "wordId" })
        );
    }

    #[test]
    fn test_comma_separated_value_is_an_array() {
        assert_eq!(
            id_query_parameter(&parameters(&[("bookId", "x1,x2")]), "bookId", "siteId"),
            Err(UserError::ArrayParameter { name: "siteId" })
        );
    }

    #[test]
    fn test_repeated_key_is_an_array() {
        assert_eq!(
            id_query_parameter(
                &parameters(&[("wordId", "1"), ("wordId", "2")]),
                "wordId",
                "wordId"
            ),
            Err(UserError::ArrayParameter { name: "wordId" })
        );
    }

    #[test]
    fn test_malformed_id() {
        assert_eq!(
            id_query_parameter(&parameters(&[("bookId", "abc")]), "bookId", "siteId"),
            Err(UserError::MalformedParameter { name: "bookId" })
        );
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Body {
        word: String,
    }

    #[test]
    fn test_array_field_in_body() {
        let body = Ok(Json(serde_json::json!({"word": ["a", "b"]})));
        assert_eq!(
            json_body_without_arrays::<Body>(body, &["word"]),
            Err(UserError::ArrayParameter { name: "word" })
        );

        let body = Ok(Json(serde_json::json!({"word": "a"})));
        assert_eq!(
            json_body_without_arrays::<Body>(body, &["word"]),
            Ok(Body {
                word: "a".to_string()
            })
        );
    }

    #[test]
    fn test_missing_field_in_body() {
        let body = Ok(Json(serde_json::json!({})));
        assert!(matches!(
            json_body_without_arrays::<Body>(body, &["word"]),
            Err(UserError::MalformedBody { .. })
        ));
    }
}
