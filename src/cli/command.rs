use crate::params::DbQueryParams;

pub enum Command {
    // Users
    UserAdd {
        name: String,
        email: String,
    },
    UserEdit {
        id: String,
        name: String,
        email: String,
    },
    UserGet {
        id: String,
    },
    UserList,
    UserDelete {
        id: String,
    },
    UserSearch {
        pattern: String,
    },
    UserFind {
        needle: String,
    },
    UserPage {
        params: DbQueryParams,
    },
    UserCount {
        params: Option<DbQueryParams>,
    },
    UserSeed {
        count: usize,
    },
    UserDrop,
    // Indexes
    EnsureTtl,
    EnsureTextIndex {
        fields: Vec<String>,
    },
    UserTextSearch {
        search: String,
        skip: u64,
        limit: u64,
    },
    // Observability
    Metrics,
}
