//! Relational data API client.
//!
//! Rows are addressed with equality filters (`?column=eq.value`). Writes ask
//! for the written row back with `Prefer: return=representation`.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::types::{ADMIN_ROLE, RoleRow};
use super::{BackendClient, BackendError};
use crate::models::{Profile, ProfileUpdate, Session};
use crate::services::auth::{ProfileStore, RoleDirectory};

const RETURN_REPRESENTATION: &str = "return=representation";

/// Client for the relational data API.
#[derive(Clone)]
pub struct RestClient {
    backend: BackendClient,
}

impl RestClient {
    #[must_use]
    pub const fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    fn table_url(
        &self,
        table: &str,
        filters: &[(&str, String)],
        extra: &[(&str, &str)],
    ) -> Result<url::Url, BackendError> {
        let mut query: Vec<(&str, &str)> = filters
            .iter()
            .map(|(column, value)| (*column, value.as_str()))
            .collect();
        query.extend_from_slice(extra);
        self.backend.endpoint(&format!("rest/v1/{table}"), &query)
    }

    /// Fetch the first row matching every equality filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. A missing row is `Ok(None)`.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        bearer: &str,
    ) -> Result<Option<T>, BackendError> {
        let url = self.table_url(table, filters, &[("select", "*"), ("limit", "1")])?;
        let request = self.backend.request(Method::GET, url, Some(bearer));
        let rows: Vec<T> = self.backend.send(request).await?;
        Ok(rows.into_iter().next())
    }

    /// Update the row whose `id` equals `id` and return it.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if no row matched.
    pub async fn update_by_id<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        body: &B,
        bearer: &str,
    ) -> Result<T, BackendError> {
        let url = self.table_url(table, &[("id", eq(id))], &[])?;
        let request = self
            .backend
            .request(Method::PATCH, url, Some(bearer))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(body);
        let rows: Vec<T> = self.backend.send(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("{table} row {id}")))
    }

    /// Insert a row and return it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or nothing was returned.
    pub async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        bearer: &str,
    ) -> Result<T, BackendError> {
        let url = self.table_url(table, &[], &[])?;
        let request = self
            .backend
            .request(Method::POST, url, Some(bearer))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(body);
        let rows: Vec<T> = self.backend.send(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("inserted {table} row")))
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl RoleDirectory for RestClient {
    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn is_admin(&self, session: &Session) -> Result<bool, BackendError> {
        let row: Option<RoleRow> = self
            .fetch_one(
                self.backend.roles_table(),
                &[("user_id", eq(session.user.id)), ("role", eq(ADMIN_ROLE))],
                &session.access_token,
            )
            .await?;
        Ok(row.is_some_and(|row| row.is_admin()))
    }
}

#[async_trait]
impl ProfileStore for RestClient {
    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        self.fetch_one(
            self.backend.profiles_table(),
            &[("id", eq(session.user.id))],
            &session.access_token,
        )
        .await
    }

    #[instrument(skip(self, session, update), fields(user_id = %session.user.id))]
    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.update_by_id(
            self.backend.profiles_table(),
            &session.user.id.to_string(),
            update,
            &session.access_token,
        )
        .await
    }

    #[instrument(skip(self, session, profile), fields(user_id = %session.user.id))]
    async fn create_profile(
        &self,
        session: &Session,
        profile: &Profile,
    ) -> Result<Profile, BackendError> {
        self.insert(self.backend.profiles_table(), profile, &session.access_token)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use secrecy::SecretString;

    use crate::config::BackendConfig;

    fn rest() -> RestClient {
        RestClient::new(
            BackendClient::new(&BackendConfig {
                url: url::Url::parse("https://project.example.com").unwrap(),
                anon_key: SecretString::from("anon-key"),
                roles_table: "user_roles".to_string(),
                profiles_table: "profiles".to_string(),
                role_lookup_timeout: Duration::from_secs(5),
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_table_url_with_filters() {
        let url = rest()
            .table_url(
                "user_roles",
                &[("user_id", eq("abc")), ("role", eq(ADMIN_ROLE))],
                &[("select", "*"), ("limit", "1")],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.com/rest/v1/user_roles?user_id=eq.abc&role=eq.admin&select=*&limit=1"
        );
    }

    #[test]
    fn test_table_url_without_query() {
        let url = rest().table_url("profiles", &[], &[]).unwrap();
        assert_eq!(url.as_str(), "https://project.example.com/rest/v1/profiles");
    }
}
