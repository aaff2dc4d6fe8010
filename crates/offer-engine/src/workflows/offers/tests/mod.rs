mod common;

mod integration;
mod lifecycle;
mod routing;
