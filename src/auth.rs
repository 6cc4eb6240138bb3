use anyhow::{Context, Result, bail};

use crate::twitter::{SocialClient, TwitterApi};
use crate::types::Profile;

/// Authenticated X API context for the topic clients.
pub struct TwitterContext {
    pub client: TwitterApi,
    pub profile: Profile,
}

/// Resolve the account behind `access_token` and return a client bound to it.
pub async fn authenticate(base: &str, access_token: &str) -> Result<TwitterContext> {
    if access_token.trim().is_empty() {
        bail!("no X access token configured; run setup-account or set TWITTER_ACCESS_TOKEN");
    }

    let probe = TwitterApi::new(base, access_token.trim());
    let profile = probe
        .me()
        .await
        .context("X authentication failed (GET /2/users/me)")?;

    Ok(TwitterContext {
        client: probe.with_profile(profile.clone()),
        profile,
    })
}
