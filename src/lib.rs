//! toolchat: a terminal chat front-end for OpenAI-compatible LLMs that can
//! search the web, run sandboxed JavaScript and fetch URLs through a proxy
//! while it answers.

pub mod agent;
pub mod config;
pub mod credentials;
pub mod extractor;
pub mod providers;
