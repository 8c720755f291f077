//! Access-token acquisition for the mobile rewards API: drive the
//! authorize flow in the already-authenticated context and read the token
//! off the redirect fragment.

use std::time::Duration;

use harvest_browser::{smart_wait_for, Page};
use harvest_types::FlowError;

const AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf\
?client_id=0000000040170455\
&scope=service%3A%3Aprod.rewardsplatform.microsoft.com%3A%3AMBI_SSL\
&response_type=token\
&redirect_uri=https%3A%2F%2Flogin.live.com%2Foauth20_desktop.srf";

/// Navigate the authorize endpoint and wait for the desktop redirect to
/// carry `access_token` in its fragment.
pub async fn acquire_access_token(page: &dyn Page) -> Result<String, FlowError> {
    page.goto(AUTHORIZE_URL).await.map_err(FlowError::from)?;

    let landed = smart_wait_for(
        || async {
            let url = page.current_url().await?;
            Ok(url.contains("access_token="))
        },
        Duration::from_millis(1500),
        Duration::from_secs(5),
    )
    .await
    .map_err(FlowError::from)?;

    if !landed {
        return Err(FlowError::LoginRecoverable("authorize flow never redirected".into()));
    }

    let url = page.current_url().await.map_err(FlowError::from)?;
    extract_token(&url)
        .ok_or_else(|| FlowError::LoginRecoverable("redirect carried no access token".into()))
}

pub(crate) fn extract_token(url: &str) -> Option<String> {
    let tail = url.split_once("access_token=")?.1;
    let token = tail.split(['&', '#']).next()?;
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_fragment() {
        let url = "https://login.live.com/oauth20_desktop.srf#access_token=EwA8A...xyz&token_type=bearer";
        assert_eq!(extract_token(url).as_deref(), Some("EwA8A...xyz"));
    }

    #[test]
    fn missing_token_is_none() {
        assert!(extract_token("https://login.live.com/oauth20_desktop.srf#error=denied").is_none());
        assert!(extract_token("https://login.live.com/oauth20_desktop.srf#access_token=").is_none());
    }
}
