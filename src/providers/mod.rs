pub mod crunchbase;
pub mod linkedin;
pub mod nominatim;
pub mod openai;
