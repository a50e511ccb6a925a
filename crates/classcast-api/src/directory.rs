//! Client for the platform's student directory service.
//!
//! The roster is owned elsewhere; this backend only ever reads it, once per
//! preview/create/edit, and resolves audiences against that snapshot.

use classcast_types::models::Student;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("student directory unreachable: {0}")]
    Unreachable(String),

    #[error("student directory returned a bad payload: {0}")]
    BadPayload(String),
}

pub enum Directory {
    Http(HttpDirectory),
    /// Fixed roster for tests and local development.
    Fixed(Vec<Student>),
}

impl Directory {
    pub fn http(base_url: String, service_token: Option<String>) -> Self {
        Self::Http(HttpDirectory {
            client: reqwest::Client::new(),
            base_url,
            service_token,
        })
    }

    pub fn fixed(roster: Vec<Student>) -> Self {
        Self::Fixed(roster)
    }

    /// One roster snapshot. A fetch failure is an error, never an empty
    /// roster.
    pub async fn list_students(&self) -> Result<Vec<Student>, DirectoryError> {
        match self {
            Self::Http(http) => http.list_students().await,
            Self::Fixed(roster) => Ok(roster.clone()),
        }
    }
}

pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    service_token: Option<String>,
}

impl HttpDirectory {
    async fn list_students(&self) -> Result<Vec<Student>, DirectoryError> {
        let url = format!("{}/students", self.base_url.trim_end_matches('/'));
        let mut req = self.client.get(&url);
        if let Some(token) = &self.service_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Unreachable(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }

        resp.json::<Vec<Student>>()
            .await
            .map_err(|e| DirectoryError::BadPayload(e.to_string()))
    }
}
