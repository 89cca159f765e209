pub mod admin_cache;
pub mod db_utils;
pub mod identity_filter;
pub mod pagination;
