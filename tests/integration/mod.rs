//! Integration tests across files, archives and HTTP providers

mod etl_pipeline;
mod http_clients;
