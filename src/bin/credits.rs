use anyhow::Result;
use clap::Parser;
use reposense::{check_credits, GithubClient};

#[derive(Parser, Debug)]
#[command(
    name = "reposense-credits",
    about = "Estimate the credit cost of indexing a GitHub repository"
)]
struct CreditsCli {
    /// GitHub repository URL (https://github.com/owner/repo)
    #[arg(long, env = "REPOSENSE_REPO_URL")]
    repo_url: String,

    /// GitHub access token; unauthenticated requests are heavily rate limited
    #[arg(long, env = "GITHUB_TOKEN")]
    github_token: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = CreditsCli::parse();
    let host = GithubClient::new(cli.github_token)?;
    let count = check_credits(&host, &cli.repo_url).await?;
    println!(
        "Indexing this repository will cost {count} credit{}.",
        if count == 1 { "" } else { "s" }
    );
    Ok(())
}
