// Interface adapters: host bindings, HTTP clients and message listeners.

pub mod clients;
pub mod clock;
pub mod host;
pub mod listener;
pub mod state;
pub mod views;
