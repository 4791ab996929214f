pub mod sequence_parser;
pub mod xml_parser;

pub use sequence_parser::{SequenceFile, load_sequence, save_sequence};
pub use xml_parser::InstanceXmlParser;
