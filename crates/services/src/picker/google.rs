use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    DriveScope, OAuthTokenFlow, PickedDocument, PickerAction, PickerConfig, PickerError,
    PickerWidget, FOLDER_MIME_TYPE,
};

/// The authorization code and the `state` echoed back by the consent redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentResponse {
    pub code: String,
    pub state: String,
}

impl ConsentResponse {
    /// Reads `code` and `state` from the query of a redirect URL. `None` when
    /// either is absent, as with `?error=access_denied`.
    pub fn from_redirect(redirect: &str) -> Option<Self> {
        let url = reqwest::Url::parse(redirect.trim()).ok()?;
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(Self {
            code: code?,
            state: state?,
        })
    }
}

/// Shows the consent URL to the user and returns what the redirect carried,
/// or `None` when the user declines.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    async fn authorize(&self, authorize_url: &str) -> Option<ConsentResponse>;
}

/// Google OAuth authorization-code flow for installed applications.
pub struct GoogleOAuthFlow {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    scope: String,
    prompt: Arc<dyn ConsentPrompt>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

impl GoogleOAuthFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        client_id: String,
        client_secret: Option<String>,
        redirect_uri: String,
        auth_url: String,
        token_url: String,
        scope: String,
        prompt: Arc<dyn ConsentPrompt>,
    ) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            redirect_uri,
            auth_url,
            token_url,
            scope,
            prompt,
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=online&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scope),
            state
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, PickerError> {
        let mut form = vec![
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let resp = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| PickerError::OAuth(format!("Token exchange failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PickerError::OAuth(format!(
                "Token exchange failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PickerError::OAuth(format!("Failed to parse token response: {}", e)))?;
        if token.access_token.is_empty() {
            return Err(PickerError::OAuth("Token response had no access token".to_string()));
        }
        Ok(token.access_token)
    }
}

#[async_trait]
impl OAuthTokenFlow for GoogleOAuthFlow {
    async fn request_access_token(&self) -> Result<Option<String>, PickerError> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorize_url(&state);

        let response = match self.prompt.authorize(&url).await {
            Some(response) if !response.code.trim().is_empty() => response,
            _ => {
                debug!("OAuth consent dismissed");
                return Ok(None);
            }
        };
        if response.state != state {
            warn!("OAuth redirect carried an unexpected state");
            return Err(PickerError::OAuth(
                "State mismatch in authorization response".to_string(),
            ));
        }

        self.exchange_code(response.code.trim()).await.map(Some)
    }
}

/// A folder offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    pub drive_id: Option<String>,
    pub drive_name: Option<String>,
}

/// Lets the user pick one of the listed folders; `None` cancels.
#[async_trait]
pub trait FolderChooser: Send + Sync {
    async fn choose(&self, folders: &[FolderEntry]) -> Option<usize>;
}

/// One page of a Drive v3 list response.
trait Page: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

impl Page for FileList {
    type Item = DriveFile;

    fn into_parts(self) -> (Vec<DriveFile>, Option<String>) {
        (self.files, self.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveList {
    #[serde(default)]
    drives: Vec<SharedDrive>,
    next_page_token: Option<String>,
}

impl Page for DriveList {
    type Item = SharedDrive;

    fn into_parts(self) -> (Vec<SharedDrive>, Option<String>) {
        (self.drives, self.next_page_token)
    }
}

#[derive(Debug, Deserialize)]
struct SharedDrive {
    id: String,
    #[serde(default)]
    name: String,
}

/// Folder picker backed by the Drive v3 REST API.
pub struct DriveFolderWidget {
    client: Client,
    api_url: String,
    api_key: String,
    chooser: Arc<dyn FolderChooser>,
}

impl DriveFolderWidget {
    pub fn new(
        client: Client,
        api_url: &str,
        api_key: String,
        chooser: Arc<dyn FolderChooser>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            chooser,
        }
    }

    async fn list_folders(
        &self,
        access_token: &str,
        parent: &str,
        drive_id: Option<&str>,
    ) -> Result<Vec<DriveFile>, PickerError> {
        let query = format!(
            "'{}' in parents and mimeType = '{}' and trashed = false",
            parent, FOLDER_MIME_TYPE
        );
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", "nextPageToken,files(id,name)"),
            ("pageSize", "100"),
            ("key", self.api_key.as_str()),
        ];
        if let Some(drive_id) = drive_id {
            params.push(("corpora", "drive"));
            params.push(("driveId", drive_id));
            params.push(("includeItemsFromAllDrives", "true"));
            params.push(("supportsAllDrives", "true"));
        }

        self.list_all::<FileList>(access_token, "files", &params, "folders").await
    }

    async fn list_drives(&self, access_token: &str) -> Result<Vec<SharedDrive>, PickerError> {
        let params = [("pageSize", "100"), ("key", self.api_key.as_str())];
        self.list_all::<DriveList>(access_token, "drives", &params, "drives").await
    }

    /// Follows `nextPageToken` until the listing is exhausted.
    async fn list_all<P>(
        &self,
        access_token: &str,
        resource: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<Vec<P::Item>, PickerError>
    where
        P: Page + Send,
        P::Item: Send,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(format!("{}/{}", self.api_url, resource))
                .bearer_auth(access_token)
                .query(params);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: P = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PickerError::Widget(format!("List {} failed: {}", what, e)))?
                .json()
                .await
                .map_err(|e| PickerError::Widget(format!("Failed to parse {}: {}", what, e)))?;
            let (page_items, next) = page.into_parts();
            items.extend(page_items);
            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl PickerWidget for DriveFolderWidget {
    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn load_renderer(&self) -> Result<(), PickerError> {
        // Terminal rendering needs no extra assets.
        Ok(())
    }

    async fn show(
        &self,
        config: &PickerConfig,
        access_token: &str,
    ) -> Result<PickerAction, PickerError> {
        let mut folders = Vec::new();
        for view in &config.views {
            match view.scope {
                DriveScope::MyDrive => {
                    for file in self.list_folders(access_token, "root", None).await? {
                        folders.push(FolderEntry {
                            id: file.id,
                            name: file.name,
                            drive_id: None,
                            drive_name: None,
                        });
                    }
                }
                DriveScope::SharedDrives => {
                    for drive in self.list_drives(access_token).await? {
                        for file in self
                            .list_folders(access_token, &drive.id, Some(&drive.id))
                            .await?
                        {
                            folders.push(FolderEntry {
                                id: file.id,
                                name: file.name,
                                drive_id: Some(drive.id.clone()),
                                drive_name: Some(drive.name.clone()),
                            });
                        }
                    }
                }
            }
        }
        debug!(count = folders.len(), "Folders listed for picker");

        let Some(index) = self.chooser.choose(&folders).await else {
            return Ok(PickerAction::Cancel);
        };
        // An out-of-range choice is reported as an empty pick.
        let documents = folders
            .into_iter()
            .nth(index)
            .map(|folder| PickedDocument {
                id: Some(folder.id),
                name: Some(folder.name),
                mime_type: Some(FOLDER_MIME_TYPE.to_string()),
                drive_id: folder.drive_id,
            })
            .into_iter()
            .collect();
        Ok(PickerAction::Picked(documents))
    }
}
