//! Upload validation.
//!
//! Runs after staging has computed `size` from the current byte source.
//! Errors accumulate into a field-keyed set; the orchestrator blocks the
//! commit when any exist.

use std::sync::Arc;

use fc_core::config::AttachmentConfig;
use fc_core::ValidationErrors;

use crate::model::Attachment;

/// Checks staged attachments against the configured constraints.
pub struct Validator {
    config: Arc<AttachmentConfig>,
}

impl Validator {
    pub fn new(config: Arc<AttachmentConfig>) -> Self {
        Self { config }
    }

    pub fn validate(&self, attachment: &Attachment) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if attachment.filename.trim().is_empty() {
            errors.add("filename", "can't be blank");
        }
        if attachment.content_type.trim().is_empty() {
            errors.add("content_type", "can't be blank");
        }

        if attachment.size == 0 {
            errors.add("size", "can't be blank");
        } else if attachment.size < self.config.size.min {
            errors.add(
                "size",
                format!("is below the minimum of {} bytes", self.config.size.min),
            );
        } else if attachment.size > self.config.size.max {
            errors.add(
                "size",
                format!("exceeds the maximum of {} bytes", self.config.size.max),
            );
        }

        if !attachment.content_type.trim().is_empty()
            && !self.config.content_type_allowed(&attachment.content_type)
        {
            errors.add("content_type", "is not allowed");
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::config::SizeRange;

    fn validator(config: AttachmentConfig) -> Validator {
        Validator::new(Arc::new(config))
    }

    fn attachment(size: u64) -> Attachment {
        let mut attachment = Attachment::new("photo.jpg", "image/jpeg");
        attachment.size = size;
        attachment
    }

    #[test]
    fn accepts_a_well_formed_attachment() {
        let errors = validator(AttachmentConfig::default()).validate(&attachment(1024));
        assert!(errors.is_empty());
    }

    #[test]
    fn rejects_blank_fields() {
        let mut subject = attachment(0);
        subject.filename = String::new();
        subject.content_type = String::new();

        let errors = validator(AttachmentConfig::default()).validate(&subject);
        assert!(errors.has_error("filename"));
        assert!(errors.has_error("content_type"));
        assert!(errors.has_error("size"));
    }

    #[test]
    fn rejects_sizes_outside_the_configured_range() {
        let config = AttachmentConfig {
            size: SizeRange::new(100, 1000),
            ..Default::default()
        };
        let validator = validator(config);

        assert!(validator.validate(&attachment(99)).has_error("size"));
        assert!(validator.validate(&attachment(1001)).has_error("size"));
        assert!(validator.validate(&attachment(100)).is_empty());
        assert!(validator.validate(&attachment(1000)).is_empty());
    }

    #[test]
    fn rejects_content_types_outside_the_allow_list() {
        let config = AttachmentConfig {
            allowed_content_types: vec!["image".to_string()],
            ..Default::default()
        };
        let validator = validator(config);

        let mut pdf = attachment(10);
        pdf.filename = "report.pdf".to_string();
        pdf.content_type = "application/pdf".to_string();

        let errors = validator.validate(&pdf);
        assert!(errors.has_error("content_type"));
        assert!(!errors.has_error("size"));
    }

    #[test]
    fn empty_allow_list_accepts_any_type() {
        let mut exe = attachment(10);
        exe.content_type = "application/octet-stream".to_string();

        let errors = validator(AttachmentConfig::default()).validate(&exe);
        assert!(errors.is_empty());
    }

    #[test]
    fn errors_accumulate_rather_than_short_circuit() {
        let config = AttachmentConfig {
            allowed_content_types: vec!["image".to_string()],
            size: SizeRange::new(100, 1000),
            ..Default::default()
        };
        let mut subject = attachment(5);
        subject.content_type = "application/pdf".to_string();

        let errors = validator(config).validate(&subject);
        assert!(errors.has_error("size"));
        assert!(errors.has_error("content_type"));
    }
}
