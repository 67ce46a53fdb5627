//! Layered environment merge for execution pipelines.
//!
//! Priority order, later wins: template declarations < environment
//! references in list order < runtime overrides. Secret values are
//! decrypted here and live only in the resulting ExecutionContext
//! payload; they never enter Temporal workflow history.

use std::collections::HashMap;

use stigmer_api::Resource;
use stigmer_api::v1::{EnvVarValue, Environment, EnvironmentSpec};
use stigmer_crypto::SecretBox;
use stigmer_pipeline::PipelineError;

/// Merge the three layers into the plaintext map an ExecutionContext
/// carries.
pub fn merge(
    template: Option<&EnvironmentSpec>,
    environments: &[Environment],
    runtime: &HashMap<String, String>,
    secrets: &SecretBox,
) -> Result<HashMap<String, EnvVarValue>, PipelineError> {
    let mut result: HashMap<String, EnvVarValue> = HashMap::new();

    if let Some(spec) = template {
        for (key, value) in &spec.data {
            result.insert(key.clone(), value.clone());
        }
    }

    for environment in environments {
        let Some(spec) = &environment.spec else {
            continue;
        };
        for (key, value) in &spec.data {
            let plain = if value.is_secret {
                secrets.decrypt(&value.value).map_err(|e| {
                    PipelineError::internal(format!(
                        "decrypting {key} from environment {}: {e}",
                        environment.name()
                    ))
                })?
            } else {
                value.value.clone()
            };
            result.insert(
                key.clone(),
                EnvVarValue {
                    value: plain,
                    is_secret: value.is_secret,
                },
            );
        }
    }

    for (key, value) in runtime {
        result.insert(
            key.clone(),
            EnvVarValue {
                value: value.clone(),
                is_secret: false,
            },
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigmer_api::v1::ApiResourceMetadata;

    fn var(value: &str, is_secret: bool) -> EnvVarValue {
        EnvVarValue {
            value: value.to_string(),
            is_secret,
        }
    }

    fn environment(name: &str, data: Vec<(&str, EnvVarValue)>) -> Environment {
        Environment {
            metadata: Some(ApiResourceMetadata {
                name: name.to_string(),
                ..Default::default()
            }),
            spec: Some(EnvironmentSpec {
                data: data
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }),
            status: None,
        }
    }

    #[test]
    fn later_layers_win() {
        let secrets = SecretBox::new(&SecretBox::generate_key());
        let template = EnvironmentSpec {
            data: [
                ("LOG_LEVEL".to_string(), var("info", false)),
                ("REGION".to_string(), var("us-east-1", false)),
            ]
            .into_iter()
            .collect(),
        };
        let envs = vec![
            environment("base", vec![("REGION", var("eu-west-1", false))]),
            environment("override", vec![("REGION", var("eu-central-1", false))]),
        ];
        let runtime = [("LOG_LEVEL".to_string(), "debug".to_string())]
            .into_iter()
            .collect();

        let merged = merge(Some(&template), &envs, &runtime, &secrets).unwrap();
        assert_eq!(merged["REGION"].value, "eu-central-1");
        assert_eq!(merged["LOG_LEVEL"].value, "debug");
    }

    #[test]
    fn secrets_are_decrypted() {
        let secrets = SecretBox::new(&SecretBox::generate_key());
        let sealed = secrets.encrypt("ghp_abc").unwrap();
        let envs = vec![environment(
            "prod",
            vec![("GITHUB_TOKEN", var(&sealed, true))],
        )];

        let merged = merge(None, &envs, &HashMap::new(), &secrets).unwrap();
        assert_eq!(merged["GITHUB_TOKEN"].value, "ghp_abc");
        assert!(merged["GITHUB_TOKEN"].is_secret);
    }

    #[test]
    fn foreign_ciphertext_fails_loudly() {
        let ours = SecretBox::new(&SecretBox::generate_key());
        let theirs = SecretBox::new(&SecretBox::generate_key());
        let sealed = theirs.encrypt("x").unwrap();
        let envs = vec![environment("prod", vec![("KEY", var(&sealed, true))])];

        let err = merge(None, &envs, &HashMap::new(), &ours).unwrap_err();
        assert!(err.message.contains("KEY"));
        assert!(err.message.contains("prod"));
    }
}
