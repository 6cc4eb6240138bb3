use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::types::{Profile, SearchMode, Tweet};

/// Smallest page the recent-search endpoint accepts.
const MIN_SEARCH_PAGE: usize = 10;

/// Largest page the recent-search endpoint accepts.
const MAX_SEARCH_PAGE: usize = 100;

/// Parents followed when rebuilding a reply thread.
pub const MAX_THREAD_DEPTH: usize = 10;

const TWEET_FIELDS: &str = "author_id,conversation_id,created_at,referenced_tweets";
const USER_FIELDS: &str = "username,name";

/// Search/send collaborator for the social network.
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize, mode: SearchMode) -> Result<Vec<Tweet>>;

    async fn fetch_tweet(&self, id: &str) -> Result<Tweet>;

    /// Post `text`, optionally as a reply. Returns the created tweet.
    async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Tweet>;

    async fn like(&self, tweet_id: &str) -> Result<()>;

    async fn me(&self) -> Result<Profile>;
}

/// X API v2 client authenticated with an OAuth 2.0 user-context token.
pub struct TwitterApi {
    client: Client,
    base: String,
    auth_header: String,
    /// Own profile, needed to build like URLs and author new tweets.
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    author_id: Option<String>,
    conversation_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    referenced_tweets: Vec<ApiReference>,
}

#[derive(Debug, Deserialize)]
struct ApiReference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct SingleResponse<T> {
    data: T,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
    text: String,
}

impl ApiTweet {
    fn into_tweet(self, users: &HashMap<&str, &ApiUser>) -> Tweet {
        let user_id = self.author_id.unwrap_or_default();
        let (username, name) = users
            .get(user_id.as_str())
            .map(|u| (u.username.clone(), u.name.clone()))
            .unwrap_or_default();
        let in_reply_to_status_id = self
            .referenced_tweets
            .into_iter()
            .find(|r| r.kind == "replied_to")
            .map(|r| r.id);
        Tweet {
            conversation_id: self.conversation_id.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            user_id,
            username,
            name,
            text: self.text,
            in_reply_to_status_id,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl CreatedTweet {
    /// A reply joins its parent's conversation when that is known, otherwise
    /// the parent id stands in for it. A root post starts its own.
    fn into_tweet(
        self,
        profile: &Profile,
        in_reply_to: Option<&str>,
        parent_conversation: Option<String>,
    ) -> Tweet {
        let conversation_id = match in_reply_to {
            Some(parent) => parent_conversation.unwrap_or_else(|| parent.to_string()),
            None => self.id.clone(),
        };
        Tweet {
            conversation_id,
            id: self.id,
            user_id: profile.id.clone(),
            username: profile.username.clone(),
            name: profile.name.clone(),
            text: self.text,
            in_reply_to_status_id: in_reply_to.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

fn user_index(includes: &Includes) -> HashMap<&str, &ApiUser> {
    includes.users.iter().map(|u| (u.id.as_str(), u)).collect()
}

impl TwitterApi {
    pub fn new(base: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {access_token}"),
            profile: None,
        }
    }

    /// Attach the authenticated profile (see `auth::authenticate`).
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GET {path} failed ({status}): {body}");
        }
        resp.json().await.with_context(|| format!("GET {path}: bad body"))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .client
            .post(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("POST {path} failed ({status}): {body}");
        }
        resp.json().await.with_context(|| format!("POST {path}: bad body"))
    }

    fn own_profile(&self) -> Result<&Profile> {
        self.profile
            .as_ref()
            .context("twitter client has no profile; authenticate first")
    }
}

#[async_trait]
impl SocialClient for TwitterApi {
    async fn search(&self, query: &str, limit: usize, mode: SearchMode) -> Result<Vec<Tweet>> {
        let page = limit.clamp(MIN_SEARCH_PAGE, MAX_SEARCH_PAGE);
        let sort_order = match mode {
            SearchMode::Latest => "recency",
            SearchMode::Top => "relevancy",
        };
        let resp: ListResponse = self
            .get_json(
                "/2/tweets/search/recent",
                &[
                    ("query", query.to_string()),
                    ("max_results", page.to_string()),
                    ("sort_order", sort_order.to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                    ("expansions", "author_id".to_string()),
                    ("user.fields", USER_FIELDS.to_string()),
                ],
            )
            .await?;
        let users = user_index(&resp.includes);
        let tweets: Vec<Tweet> = resp
            .data
            .into_iter()
            .take(limit)
            .map(|t| t.into_tweet(&users))
            .collect();
        debug!("Search {query:?} returned {} tweets", tweets.len());
        Ok(tweets)
    }

    async fn fetch_tweet(&self, id: &str) -> Result<Tweet> {
        let resp: SingleResponse<ApiTweet> = self
            .get_json(
                &format!("/2/tweets/{id}"),
                &[
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                    ("expansions", "author_id".to_string()),
                    ("user.fields", USER_FIELDS.to_string()),
                ],
            )
            .await?;
        let users = user_index(&resp.includes);
        Ok(resp.data.into_tweet(&users))
    }

    async fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Tweet> {
        let profile = self.own_profile()?;
        let mut body = json!({ "text": text });
        if let Some(parent) = in_reply_to {
            body["reply"] = json!({ "in_reply_to_tweet_id": parent });
        }
        let resp: SingleResponse<CreatedTweet> = self.post_json("/2/tweets", &body).await?;
        let parent_conversation = match in_reply_to {
            Some(parent) => match self.fetch_tweet(parent).await {
                Ok(t) => Some(t.conversation_id),
                Err(e) => {
                    debug!("Could not resolve conversation of {parent}: {e:#}");
                    None
                }
            },
            None => None,
        };
        Ok(resp.data.into_tweet(profile, in_reply_to, parent_conversation))
    }

    async fn like(&self, tweet_id: &str) -> Result<()> {
        let profile = self.own_profile()?;
        let _: serde_json::Value = self
            .post_json(
                &format!("/2/users/{}/likes", profile.id),
                &json!({ "tweet_id": tweet_id }),
            )
            .await?;
        Ok(())
    }

    async fn me(&self) -> Result<Profile> {
        let resp: SingleResponse<ApiUser> = self.get_json("/2/users/me", &[]).await?;
        Ok(Profile {
            id: resp.data.id,
            username: resp.data.username,
            name: resp.data.name,
        })
    }
}

/// Walk reply parents of `tweet`, oldest first, ending with `tweet` itself.
///
/// A failed lookup ends the walk early; the partial thread is returned.
pub async fn build_conversation_thread(
    tweet: &Tweet,
    client: &dyn SocialClient,
    max_depth: usize,
) -> Vec<Tweet> {
    let mut thread = vec![tweet.clone()];
    let mut parent = tweet.in_reply_to_status_id.clone();

    while let Some(id) = parent.take() {
        if thread.len() > max_depth {
            break;
        }
        if thread.iter().any(|t| t.id == id) {
            break;
        }
        match client.fetch_tweet(&id).await {
            Ok(t) => {
                parent = t.in_reply_to_status_id.clone();
                thread.push(t);
            }
            Err(e) => {
                warn!("Thread lookup for {id} failed, using partial thread: {e:#}");
                break;
            }
        }
    }

    thread.reverse();
    thread
}
