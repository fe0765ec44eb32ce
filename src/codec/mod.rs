//! Wire/text codecs. Currently just the track CSV format.

pub mod csv;
