//! Evidence bundle submitted with a judging request.

use std::path::Path;

use reqwest::multipart::{Form, Part};

use crate::error::{ApiError, Result};

/// A file uploaded alongside the evidence (pitch deck, demo video).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an attachment from disk, keeping its file name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ApiError::InvalidEvidence(format!("{} has no file name", path.display()))
            })?;
        Ok(Self { file_name, bytes })
    }

    fn into_part(self) -> Part {
        Part::bytes(self.bytes).file_name(self.file_name)
    }
}

/// Everything the backend needs to judge one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub team_name: String,
    pub github_url: String,
    pub transcript: Option<String>,
    pub pitch_deck: Option<Attachment>,
    pub demo_video: Option<Attachment>,
}

impl Evidence {
    pub fn new(team_name: impl Into<String>, github_url: impl Into<String>) -> Self {
        Self {
            team_name: team_name.into(),
            github_url: github_url.into(),
            transcript: None,
            pitch_deck: None,
            demo_video: None,
        }
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn with_pitch_deck(mut self, deck: Attachment) -> Self {
        self.pitch_deck = Some(deck);
        self
    }

    pub fn with_demo_video(mut self, video: Attachment) -> Self {
        self.demo_video = Some(video);
        self
    }

    /// Check the required fields before anything goes over the wire.
    pub fn validate(&self) -> Result<()> {
        if self.team_name.trim().is_empty() {
            return Err(ApiError::InvalidEvidence("team name is required".into()));
        }
        if self.github_url.trim().is_empty() {
            return Err(ApiError::InvalidEvidence("GitHub URL is required".into()));
        }
        Ok(())
    }

    /// Multipart body for `POST /api/judge/start`.
    pub fn to_form(&self) -> Form {
        let mut form = Form::new()
            .text("team_name", self.team_name.clone())
            .text("github_url", self.github_url.clone());
        if let Some(transcript) = &self.transcript {
            form = form.text("transcript", transcript.clone());
        }
        if let Some(deck) = &self.pitch_deck {
            form = form.part("pptx_file", deck.clone().into_part());
        }
        if let Some(video) = &self.demo_video {
            form = form.part("video_file", video.clone().into_part());
        }
        form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_team_and_repo() {
        assert!(Evidence::new("Rustaceans", "https://github.com/r/r")
            .validate()
            .is_ok());
        assert!(matches!(
            Evidence::new("  ", "https://github.com/r/r").validate(),
            Err(ApiError::InvalidEvidence(_))
        ));
        assert!(matches!(
            Evidence::new("Rustaceans", "").validate(),
            Err(ApiError::InvalidEvidence(_))
        ));
    }

    #[test]
    fn builder_sets_optional_parts() {
        let evidence = Evidence::new("t", "https://github.com/t/t")
            .with_transcript("hello judges")
            .with_pitch_deck(Attachment::new("deck.pptx", vec![1, 2, 3]));
        assert_eq!(evidence.transcript.as_deref(), Some("hello judges"));
        assert_eq!(evidence.pitch_deck.unwrap().file_name, "deck.pptx");
        assert!(evidence.demo_video.is_none());
    }

    #[tokio::test]
    async fn attachment_from_path_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.mp4");
        std::fs::write(&path, b"fake video").unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        assert_eq!(attachment.file_name, "demo.mp4");
        assert_eq!(attachment.bytes, b"fake video");
    }

    #[tokio::test]
    async fn missing_attachment_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Attachment::from_path(&dir.path().join("nope.pptx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Io(_)));
    }
}
