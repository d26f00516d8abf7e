pub mod http_registry_client;
