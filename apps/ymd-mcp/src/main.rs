use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = ymd_mcp::Args::parse();

	ymd_mcp::run(args).await
}
