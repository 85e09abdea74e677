use osmpbf::{DenseNodeInfo, Info};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Element metadata carried through from input to output unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFields {
    pub visible: Option<bool>,
    pub version: Option<i64>,
    pub changeset: Option<i64>,
    pub timestamp: Option<String>,
    pub uid: Option<i64>,
    pub user: Option<String>,
}

impl MetadataFields {
    /// Metadata for elements created during the rewrite.
    pub fn synthetic() -> Self {
        Self {
            version: Some(1),
            ..Self::default()
        }
    }

    /// Attribute pairs in OSM XML order. Absent fields are skipped.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        if let Some(version) = self.version {
            attrs.push(("version", version.to_string()));
        }
        if let Some(timestamp) = &self.timestamp {
            attrs.push(("timestamp", timestamp.clone()));
        }
        if let Some(changeset) = self.changeset {
            attrs.push(("changeset", changeset.to_string()));
        }
        if let Some(uid) = self.uid {
            attrs.push(("uid", uid.to_string()));
        }
        if let Some(user) = &self.user {
            attrs.push(("user", user.clone()));
        }
        if let Some(false) = self.visible {
            attrs.push(("visible", "false".to_string()));
        }
        attrs
    }
}

pub fn build_metadata_from_info(info: &Info) -> MetadataFields {
    MetadataFields {
        visible: Some(info.visible()),
        version: info.version().map(i64::from),
        changeset: info.changeset(),
        timestamp: info.milli_timestamp().and_then(format_timestamp_millis),
        uid: info.uid().map(i64::from),
        user: info
            .user()
            .and_then(|user| user.ok())
            .map(|s| s.to_string()),
    }
}

pub fn build_metadata_from_dense_info(info: &DenseNodeInfo) -> MetadataFields {
    MetadataFields {
        visible: Some(info.visible()),
        version: Some(i64::from(info.version())),
        changeset: Some(info.changeset()),
        timestamp: format_timestamp_millis(info.milli_timestamp()),
        uid: Some(i64::from(info.uid())),
        user: info.user().ok().map(|s| s.to_string()),
    }
}

pub fn format_timestamp_millis(millis: i64) -> Option<String> {
    let nanos = i128::from(millis) * 1_000_000;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    dt.format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis_as_rfc3339() {
        assert_eq!(
            format_timestamp_millis(1_704_067_200_000).as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn synthetic_metadata_only_has_version() {
        let attrs = MetadataFields::synthetic().attributes();
        assert_eq!(attrs, vec![("version", "1".to_string())]);
    }
}
