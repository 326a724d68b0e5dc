//! IRIs of the vocabularies the writer reads.
//!
//! `rdf` and `xsd` come from [`oxrdf::vocab`].

/// Data Catalog Vocabulary.
pub mod dcat {
    pub const DATASET: &str = "http://www.w3.org/ns/dcat#Dataset";
    pub const DISTRIBUTION: &str = "http://www.w3.org/ns/dcat#distribution";
    pub const KEYWORD: &str = "http://www.w3.org/ns/dcat#keyword";
    pub const LANDING_PAGE: &str = "http://www.w3.org/ns/dcat#landingPage";
    pub const ACCESS_URL: &str = "http://www.w3.org/ns/dcat#accessURL";
    pub const DOWNLOAD_URL: &str = "http://www.w3.org/ns/dcat#downloadURL";
    pub const MEDIA_TYPE: &str = "http://www.w3.org/ns/dcat#mediaType";
}

/// DCMI Metadata Terms.
pub mod dct {
    pub const TITLE: &str = "http://purl.org/dc/terms/title";
    pub const DESCRIPTION: &str = "http://purl.org/dc/terms/description";
    pub const LICENSE: &str = "http://purl.org/dc/terms/license";
    pub const FORMAT: &str = "http://purl.org/dc/terms/format";
}

/// Data Quality Vocabulary.
pub mod dqv {
    pub const IS_MEASUREMENT_OF: &str = "http://www.w3.org/ns/dqv#isMeasurementOf";
    pub const HAS_VALUE: &str = "http://www.w3.org/ns/dqv#value";
}
