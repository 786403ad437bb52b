use anyhow::Result;
use chrono::{Local, NaiveDateTime};

use crate::{auth::Token, client::ApiClient, config::Config, inbox::InboxCache};

/// Dependencies shared by every tool call.
pub struct Context {
    pub config: Config,
    pub client: ApiClient,
    pub inbox: InboxCache,
}

impl Context {
    pub fn new(config: Config, token: Token) -> Result<Self> {
        let client = ApiClient::new(&config.api, token)?;
        let inbox = InboxCache::new(config.data_file());
        Ok(Self {
            config,
            client,
            inbox,
        })
    }

    /// The clock stamped on formatted tasks, if enabled.
    pub fn task_clock(&self) -> Option<NaiveDateTime> {
        self.config
            .get_task_tools_config()
            .show_current_time
            .then(|| Local::now().naive_local())
    }
}
