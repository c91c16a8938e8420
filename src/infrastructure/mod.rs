pub mod sqlite_kv;
