//! Stored-procedure catalog
//!
//! SQLite has no stored procedures, so the named procedures the service calls
//! are implemented here, each as SQL run against one connection (pooled or
//! inside a transaction). Procedures take named scalar parameters and return
//! zero or more result sets of JSON records, the same shape a procedure call
//! on a server database yields.
//!
//! Business-rule rejections are raised with error number
//! [`BUSINESS_RULE_ERROR_NUMBER`] and a short message such as
//! `SongDoesntExist`.

use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqliteConnection, ValueRef};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error number a procedure raises to reject a request on business grounds
pub const BUSINESS_RULE_ERROR_NUMBER: i64 = 51000;

pub const SP_SONG_CREATE: &str = "spSongCreate";
pub const SP_SONG_LIST: &str = "spSongList";
pub const SP_SONG_GET: &str = "spSongGet";
pub const SP_SONG_UPDATE: &str = "spSongUpdate";
pub const SP_SONG_DELETE: &str = "spSongDelete";

/// One result row, column name to value
pub type Record = Map<String, Value>;

/// One result set
pub type ResultSet = Vec<Record>;

const SONG_COLUMNS: &str = "id_song AS idSong, id_account AS idAccount, title, artist, lyrics, \
     original_key AS originalKey, category, date_created AS dateCreated, \
     date_modified AS dateModified, deleted";

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Failures raised while running a procedure
#[derive(Debug, Error)]
pub enum ProcedureError {
    /// The procedure raised an error with a number and message
    #[error("{message} (error {number})")]
    Raised { number: i64, message: String },

    #[error("Could not find stored procedure '{0}'")]
    UnknownProcedure(String),

    #[error("Procedure '{procedure}' expects parameter '@{name}', which was not supplied")]
    MissingParameter { procedure: String, name: String },

    #[error("Invalid value for parameter '@{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Transactions are not supported by this executor")]
    TransactionsUnsupported,

    #[error("Connection unavailable: {0}")]
    Connection(#[source] crate::Error),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

impl ProcedureError {
    /// Business-rule rejection with the standard error number
    pub fn business_rule(message: impl Into<String>) -> Self {
        ProcedureError::Raised {
            number: BUSINESS_RULE_ERROR_NUMBER,
            message: message.into(),
        }
    }
}

/// Named procedure parameters (scalars only)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap(BTreeMap<String, Value>);

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Build from a typed record; every field becomes a parameter of the same name
    ///
    /// `None` fields become `null` parameters. Nested objects and arrays are
    /// rejected because procedure parameters are scalar.
    pub fn from_record<P: Serialize + ?Sized>(record: &P) -> Result<Self, ProcedureError> {
        let value = serde_json::to_value(record).map_err(|e| ProcedureError::InvalidParameter {
            name: "*".to_string(),
            reason: e.to_string(),
        })?;
        let Value::Object(fields) = value else {
            return Err(ProcedureError::InvalidParameter {
                name: "*".to_string(),
                reason: "parameters must be a record of named fields".to_string(),
            });
        };

        let mut params = ParamMap::new();
        for (name, value) in fields {
            if value.is_array() || value.is_object() {
                return Err(ProcedureError::InvalidParameter {
                    name,
                    reason: "expected a scalar value".to_string(),
                });
            }
            params.insert(name, value);
        }
        Ok(params)
    }
}

/// Parameter access for one procedure invocation
struct Args<'p> {
    procedure: &'static str,
    params: &'p ParamMap,
}

impl<'p> Args<'p> {
    fn new(procedure: &'static str, params: &'p ParamMap) -> Self {
        Self { procedure, params }
    }

    fn missing(&self, name: &str) -> ProcedureError {
        ProcedureError::MissingParameter {
            procedure: self.procedure.to_string(),
            name: name.to_string(),
        }
    }

    fn int(&self, name: &str) -> Result<i64, ProcedureError> {
        match self.params.get(name) {
            None | Some(Value::Null) => Err(self.missing(name)),
            Some(value) => value.as_i64().ok_or_else(|| ProcedureError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected an integer, got {}", value),
            }),
        }
    }

    fn text(&self, name: &str) -> Result<&'p str, ProcedureError> {
        self.optional_text(name)?.ok_or_else(|| self.missing(name))
    }

    /// Optional parameters default to NULL when not supplied
    fn optional_text(&self, name: &str) -> Result<Option<&'p str>, ProcedureError> {
        match self.params.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ProcedureError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected text, got {}", other),
            }),
        }
    }
}

/// Run a named procedure on `conn`
pub async fn call(
    conn: &mut SqliteConnection,
    procedure: &str,
    params: &ParamMap,
) -> Result<Vec<ResultSet>, ProcedureError> {
    match procedure {
        SP_SONG_CREATE => song_create(conn, Args::new(SP_SONG_CREATE, params)).await,
        SP_SONG_LIST => song_list(conn, Args::new(SP_SONG_LIST, params)).await,
        SP_SONG_GET => song_get(conn, Args::new(SP_SONG_GET, params)).await,
        SP_SONG_UPDATE => song_update(conn, Args::new(SP_SONG_UPDATE, params)).await,
        SP_SONG_DELETE => song_delete(conn, Args::new(SP_SONG_DELETE, params)).await,
        other => Err(ProcedureError::UnknownProcedure(other.to_string())),
    }
}

fn require_not_blank(value: &str, message: &str) -> Result<(), ProcedureError> {
    if value.trim().is_empty() {
        return Err(ProcedureError::business_rule(message));
    }
    Ok(())
}

async fn song_create(
    conn: &mut SqliteConnection,
    args: Args<'_>,
) -> Result<Vec<ResultSet>, ProcedureError> {
    let id_account = args.int("idAccount")?;
    let id_user = args.int("idUser")?;
    let title = args.text("title")?;
    let artist = args.text("artist")?;
    let lyrics = args.text("lyrics")?;
    let original_key = args.optional_text("originalKey")?;
    let category = args.optional_text("category")?;

    require_not_blank(title, "TitleRequired")?;
    require_not_blank(artist, "ArtistRequired")?;
    require_not_blank(lyrics, "LyricsRequired")?;

    let row = sqlx::query(
        "INSERT INTO song (id_account, title, artist, lyrics, original_key, category, \
         id_user_created, id_user_modified) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         RETURNING id_song AS idSong",
    )
    .bind(id_account)
    .bind(title)
    .bind(artist)
    .bind(lyrics)
    .bind(original_key)
    .bind(category)
    .bind(id_user)
    .fetch_one(&mut *conn)
    .await?;

    Ok(vec![vec![row_to_record(&row)]])
}

/// Artist and search-term filters match case-insensitively over full Unicode
/// (`Água` finds `água`), so they run on the fetched rows rather than in SQL.
async fn song_list(
    conn: &mut SqliteConnection,
    args: Args<'_>,
) -> Result<Vec<ResultSet>, ProcedureError> {
    let id_account = args.int("idAccount")?;
    let category = args.optional_text("category")?;
    let artist = args.optional_text("artist")?.map(str::to_lowercase);
    let search_term = args.optional_text("searchTerm")?.map(str::to_lowercase);

    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM song \
         WHERE id_account = ?1 AND deleted = 0 \
           AND (?2 IS NULL OR category = ?2) \
         ORDER BY title COLLATE NOCASE, id_song"
    );

    let rows = sqlx::query(&sql)
        .bind(id_account)
        .bind(category)
        .fetch_all(&mut *conn)
        .await?;

    let songs = rows
        .iter()
        .map(row_to_record)
        .filter(|song| {
            artist
                .as_deref()
                .map_or(true, |needle| contains_folded(song, "artist", needle))
        })
        .filter(|song| {
            search_term.as_deref().map_or(true, |needle| {
                ["title", "artist", "lyrics"]
                    .iter()
                    .any(|column| contains_folded(song, column, needle))
            })
        })
        .collect();

    Ok(vec![songs])
}

/// `needle` must already be lowercase
fn contains_folded(record: &Record, column: &str, needle: &str) -> bool {
    record
        .get(column)
        .and_then(Value::as_str)
        .is_some_and(|text| text.to_lowercase().contains(needle))
}

async fn song_get(
    conn: &mut SqliteConnection,
    args: Args<'_>,
) -> Result<Vec<ResultSet>, ProcedureError> {
    let id_account = args.int("idAccount")?;
    let id_song = args.int("idSong")?;

    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM song WHERE id_account = ?1 AND id_song = ?2 AND deleted = 0"
    );

    let rows = sqlx::query(&sql)
        .bind(id_account)
        .bind(id_song)
        .fetch_all(&mut *conn)
        .await?;

    Ok(vec![rows.iter().map(row_to_record).collect()])
}

async fn song_update(
    conn: &mut SqliteConnection,
    args: Args<'_>,
) -> Result<Vec<ResultSet>, ProcedureError> {
    let id_account = args.int("idAccount")?;
    let id_user = args.int("idUser")?;
    let id_song = args.int("idSong")?;
    let title = args.text("title")?;
    let artist = args.text("artist")?;
    let lyrics = args.text("lyrics")?;
    let original_key = args.optional_text("originalKey")?;
    let category = args.optional_text("category")?;

    require_not_blank(title, "TitleRequired")?;
    require_not_blank(artist, "ArtistRequired")?;
    require_not_blank(lyrics, "LyricsRequired")?;

    let sql = format!(
        "UPDATE song SET title = ?1, artist = ?2, lyrics = ?3, original_key = ?4, category = ?5, \
         id_user_modified = ?6, date_modified = {NOW} \
         WHERE id_song = ?7 AND id_account = ?8 AND deleted = 0 \
         RETURNING id_song AS idSong"
    );

    let row = sqlx::query(&sql)
        .bind(title)
        .bind(artist)
        .bind(lyrics)
        .bind(original_key)
        .bind(category)
        .bind(id_user)
        .bind(id_song)
        .bind(id_account)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ProcedureError::business_rule("SongDoesntExist"))?;

    Ok(vec![vec![row_to_record(&row)]])
}

async fn song_delete(
    conn: &mut SqliteConnection,
    args: Args<'_>,
) -> Result<Vec<ResultSet>, ProcedureError> {
    let id_account = args.int("idAccount")?;
    let id_user = args.int("idUser")?;
    let id_song = args.int("idSong")?;

    let sql = format!(
        "UPDATE song SET deleted = 1, id_user_modified = ?1, date_modified = {NOW} \
         WHERE id_song = ?2 AND id_account = ?3 AND deleted = 0 \
         RETURNING id_song AS idSong"
    );

    let row = sqlx::query(&sql)
        .bind(id_user)
        .bind(id_song)
        .bind(id_account)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ProcedureError::business_rule("SongDoesntExist"))?;

    Ok(vec![vec![row_to_record(&row)]])
}

/// Convert a SQLite row to a JSON record keyed by column name
pub fn row_to_record(row: &SqliteRow) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row
                .try_get_raw(i)
                .ok()
                .and_then(|raw| {
                    if raw.is_null() {
                        Some(Value::Null)
                    } else {
                        row.try_get::<i64, _>(i)
                            .ok()
                            .map(|v| json!(v))
                            .or_else(|| row.try_get::<f64, _>(i).ok().map(|v| json!(v)))
                            .or_else(|| row.try_get::<String, _>(i).ok().map(Value::String))
                    }
                })
                .unwrap_or(Value::Null);
            (column.name().to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Lookup {
        id_account: i64,
        search_term: Option<String>,
    }

    #[test]
    fn test_params_from_record() {
        let params = ParamMap::from_record(&Lookup {
            id_account: 1,
            search_term: None,
        })
        .unwrap();

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("idAccount"), Some(&json!(1)));
        assert_eq!(params.get("searchTerm"), Some(&Value::Null));
    }

    #[test]
    fn test_params_reject_nested_values() {
        let err = ParamMap::from_record(&json!({ "tags": ["a", "b"] })).unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidParameter { ref name, .. } if name == "tags"));

        let err = ParamMap::from_record(&json!(5)).unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidParameter { .. }));
    }

    #[test]
    fn test_args_missing_and_invalid() {
        let mut params = ParamMap::new();
        params.insert("idAccount", "one");
        params.insert("title", Value::Null);
        let args = Args::new(SP_SONG_CREATE, &params);

        assert!(matches!(args.int("idAccount"), Err(ProcedureError::InvalidParameter { .. })));
        assert!(matches!(args.int("idUser"), Err(ProcedureError::MissingParameter { .. })));
        assert!(matches!(args.text("title"), Err(ProcedureError::MissingParameter { .. })));
        assert_eq!(args.optional_text("category").unwrap(), None);
    }

    #[test]
    fn test_business_rule_uses_standard_number() {
        match ProcedureError::business_rule("SongDoesntExist") {
            ProcedureError::Raised { number, message } => {
                assert_eq!(number, BUSINESS_RULE_ERROR_NUMBER);
                assert_eq!(message, "SongDoesntExist");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
