pub mod aws {
	use std::time::SystemTime;

	use aws_credential_types::Credentials;
	use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
	use aws_sigv4::sign::v4::SigningParams;
	use bytes::Bytes;
	use secrecy::{ExposeSecret, SecretString};

	use crate::llm::AIError;
	use crate::*;

	/// `accessKeyId:secretAccessKey:region`
	#[derive(Debug, Clone)]
	pub struct AwsCredentials {
		pub access_key_id: Strng,
		secret_access_key: SecretString,
		pub region: Strng,
	}

	impl AwsCredentials {
		pub fn parse(material: &SecretString) -> Result<Self, AIError> {
			let parts = material.expose_secret().split(':').collect::<Vec<_>>();
			let [id, secret, region] = parts.as_slice() else {
				return Err(AIError::InvalidKeyMaterial);
			};
			if [id, secret, region].iter().any(|p| p.trim().is_empty()) {
				return Err(AIError::InvalidKeyMaterial);
			}
			Ok(Self {
				access_key_id: strng::new(id.trim()),
				secret_access_key: SecretString::from(secret.trim().to_string()),
				region: strng::new(region.trim()),
			})
		}
	}

	/// Adds SigV4 headers to `req`. The URI must be absolute.
	pub fn sign_request(
		req: &mut ::http::Request<Bytes>,
		creds: &AwsCredentials,
		service: &str,
	) -> anyhow::Result<()> {
		let identity = Credentials::new(
			creds.access_key_id.as_str(),
			creds.secret_access_key.expose_secret(),
			None,
			None,
			"llmrelay",
		)
		.into();
		trace!("AWS signing with region: {}, service: {}", creds.region, service);

		let signing_params = SigningParams::builder()
			.identity(&identity)
			.region(creds.region.as_str())
			.name(service)
			.time(SystemTime::now())
			.settings(SigningSettings::default())
			.build()?
			.into();

		let body = req.body().clone();
		let uri = req.uri().to_string();
		let signable_request = SignableRequest::new(
			req.method().as_str(),
			uri,
			req.headers().iter().filter_map(|(k, v)| {
				std::str::from_utf8(v.as_bytes())
					.ok()
					.map(|v_str| (k.as_str(), v_str))
			}),
			SignableBody::Bytes(body.as_ref()),
		)?;

		let (signature, _sig) = sign(signable_request, &signing_params)?.into_parts();
		signature.apply_to_request_http1x(req);
		trace!("signed AWS request");
		Ok(())
	}

}
