pub mod amf0_command;
pub mod amf0_shared_object;
