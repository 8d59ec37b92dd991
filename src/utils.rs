use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;

use crate::errors::SetupError;

pub(crate) fn verify_rpc_url(rpc_url: &str) -> Result<Url, SetupError> {
    let url = Url::parse(rpc_url)
        .map_err(|err| SetupError::InvalidRpcUrl(format!("{rpc_url:?}: {err}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SetupError::InvalidRpcUrl(format!(
            "{rpc_url:?}. URL must start with http or https"
        )));
    }
    Ok(url)
}

pub(crate) fn verify_private_signer(private_key_hex: &str) -> Result<PrivateKeySigner, SetupError> {
    private_key_hex
        .trim()
        .parse::<PrivateKeySigner>()
        .map_err(|err| SetupError::InvalidPrivateSigner(err.to_string()))
}
