pub mod broker_session;
