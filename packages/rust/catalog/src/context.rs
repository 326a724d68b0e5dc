//! The conversion context: one converter and one dispatcher bound to a
//! single catalog credential.

use url::Url;

use catalogwriter_shared::Result;

use crate::converter::Converter;
use crate::dispatch::Dispatcher;

/// Everything needed to turn a graph into a catalog submission.
#[derive(Debug)]
pub struct ConversionContext {
    converter: Converter,
    dispatcher: Dispatcher,
}

impl ConversionContext {
    pub fn new(base_url: &Url, api_key: &str, append_number: bool) -> Result<Self> {
        Ok(Self {
            converter: Converter::new(append_number),
            dispatcher: Dispatcher::new(base_url, api_key)?,
        })
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
