//! Database layer: initialization, connection pool, procedure catalog and gateway

pub mod gateway;
pub mod init;
pub mod models;
pub mod pool;
pub mod procedures;

pub use gateway::*;
pub use init::*;
pub use models::*;
pub use pool::LazyPool;
pub use procedures::{
    ParamMap, ProcedureError, Record, ResultSet, BUSINESS_RULE_ERROR_NUMBER, SP_SONG_CREATE,
    SP_SONG_DELETE, SP_SONG_GET, SP_SONG_LIST, SP_SONG_UPDATE,
};
