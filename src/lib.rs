pub mod config;
pub mod controller;
pub mod domain;
pub mod efetch;
pub mod error;
pub mod esearch;
pub mod ncbi;
pub mod output;

mod xml;
