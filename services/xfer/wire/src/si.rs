//! Stream initiation element.

use crate::form::DataForm;
use crate::PROFILE_FILE_TRANSFER;
use serde::{Deserialize, Serialize};

/// File metadata carried by a file transfer offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Base name of the file, no directories
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// Feature negotiation wrapper around the data form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureNegotiation {
    /// The negotiation form
    pub form: DataForm,
}

/// Stream initiation element, used both for the offer and the peer's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInitiation {
    /// Session id; empty in answers that omit it
    #[serde(default)]
    pub id: String,
    /// Profile namespace; empty in answers that omit it
    #[serde(default)]
    pub profile: String,
    /// File metadata, present on offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileMeta>,
    /// Feature negotiation
    pub feature: FeatureNegotiation,
}

impl StreamInitiation {
    /// Build a file transfer offer for session `sid`
    pub fn file_offer<I, S>(sid: &str, file: FileMeta, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: sid.to_string(),
            profile: PROFILE_FILE_TRANSFER.to_string(),
            file: Some(file),
            feature: FeatureNegotiation {
                form: DataForm::stream_method_offer(mechanisms),
            },
        }
    }

    /// Build the answer a peer sends when it accepts an offer with `mechanism`
    pub fn submit(mechanism: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            profile: String::new(),
            file: None,
            feature: FeatureNegotiation {
                form: DataForm::stream_method_submit(mechanism),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormType;
    use crate::STREAM_METHOD_FIELD;

    #[test]
    fn test_file_offer_shape() {
        let offer = StreamInitiation::file_offer(
            "sid42",
            FileMeta {
                name: "report.pdf".to_string(),
                size: 1024,
            },
            ["http://jabber.org/protocol/ibb"],
        );

        assert_eq!(offer.id, "sid42");
        assert_eq!(offer.profile, PROFILE_FILE_TRANSFER);
        assert_eq!(offer.file.as_ref().map(|f| f.size), Some(1024));
        assert_eq!(offer.feature.form.form_type, FormType::Form);
        assert_eq!(
            offer.feature.form.options_of(STREAM_METHOD_FIELD),
            vec!["http://jabber.org/protocol/ibb"]
        );
    }
}
