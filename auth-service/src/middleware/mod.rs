pub mod auth;

pub use auth::{
    admin_auth_middleware, auth_middleware, client_id_from_request, optional_auth_middleware,
    AuthContext, AuthKind, AuthUser, ACCESS_TOKEN_COOKIE,
};
