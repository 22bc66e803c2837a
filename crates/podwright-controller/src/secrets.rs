//! Secret provisioning for an execution unit
//!
//! Decrypts the unit's secret references and creates the matching cluster
//! secrets. Every failure here is wrapped in [`Error::SecretProvisioning`]:
//! a pod without its secrets cannot run, so no secret failure is ever
//! swallowed by the failure policy.

use std::collections::BTreeMap;

use podwright_common::kube_utils::ObjectMeta;
use podwright_common::naming::{image_pull_secret_name, logging_secret_name, step_secret_name};
use podwright_common::{
    ControllerConfig, Error, LogServiceSpec, Result, SecretRef, StepSpec, UnitSpec,
    LOG_KEY_PREFIX_KEY, LOG_SERVICE_ENDPOINT_KEY, LOG_SERVICE_TOKEN_KEY,
};
use podwright_pod::k8s::Secret;
use podwright_pod::ProvisionedSecrets;
use tracing::{debug, info, warn};

use crate::client::ClusterClient;
use crate::decrypt::Decryptor;

/// Creates the image-pull, per-step and logging secrets of a unit
pub struct SecretsProvisioner<'a> {
    client: &'a dyn ClusterClient,
    decryptor: &'a dyn Decryptor,
    config: &'a ControllerConfig,
}

impl<'a> SecretsProvisioner<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        decryptor: &'a dyn Decryptor,
        config: &'a ControllerConfig,
    ) -> Self {
        Self {
            client,
            decryptor,
            config,
        }
    }

    /// Provision every secret the unit pod references
    pub async fn provision(&self, unit_id: &str, unit: &UnitSpec) -> Result<ProvisionedSecrets> {
        let image_pull = self
            .provision_image_pull_secrets(unit_id, &unit.image_pull_secrets)
            .await?;
        let per_step = self.provision_step_secrets(unit_id, &unit.steps).await?;
        let logging = self.provision_logging_secret(unit_id, &unit.logging).await?;

        let provisioned = ProvisionedSecrets {
            image_pull,
            per_step,
            logging,
        };
        info!(unit = %unit_id, secrets = provisioned.count(), "provisioned secrets");
        Ok(provisioned)
    }

    /// One registry-credentials secret per reference, named by index.
    ///
    /// Each reference must decrypt to one credential document; extra entries
    /// are ignored with a warning.
    pub async fn provision_image_pull_secrets(
        &self,
        unit_id: &str,
        refs: &[SecretRef],
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(refs.len());
        for (index, secret_ref) in refs.iter().enumerate() {
            let name = image_pull_secret_name(unit_id, index);
            self.create_image_pull_secret(unit_id, &name, secret_ref)
                .await
                .map_err(|e| Error::secret_provisioning(&name, e))?;
            names.push(name);
        }
        Ok(names)
    }

    async fn create_image_pull_secret(
        &self,
        unit_id: &str,
        name: &str,
        secret_ref: &SecretRef,
    ) -> Result<()> {
        let decrypted = self
            .decryptor
            .decrypt(&secret_ref.encryption, &secret_ref.records)
            .await?;
        let (key, credentials) = decrypted
            .first()
            .ok_or_else(|| Error::decryption(name, "no registry credentials after decryption"))?;
        if decrypted.len() > 1 {
            warn!(
                unit = %unit_id,
                secret = %name,
                entries = decrypted.len(),
                key = %key,
                "image pull secret decrypted to more than one entry, using the first record"
            );
        }

        let secret = Secret::docker_config(self.metadata(name, unit_id), credentials);
        self.client.create_secret(&secret).await?;
        debug!(unit = %unit_id, secret = %name, "created image pull secret");
        Ok(())
    }

    /// One generic secret per step secret reference, grouped by step id.
    ///
    /// Steps without secrets still get an (empty) entry.
    pub async fn provision_step_secrets(
        &self,
        unit_id: &str,
        steps: &[StepSpec],
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let mut by_step = BTreeMap::new();
        for step in steps {
            let mut names = Vec::with_capacity(step.secrets.len());
            for (index, secret_ref) in step.secrets.iter().enumerate() {
                let name = step_secret_name(unit_id, &step.id, index);
                self.create_generic_secret(unit_id, &name, secret_ref)
                    .await
                    .map_err(|e| Error::secret_provisioning(&name, e))?;
                names.push(name);
            }
            by_step.insert(step.id.clone(), names);
        }
        Ok(by_step)
    }

    async fn create_generic_secret(
        &self,
        unit_id: &str,
        name: &str,
        secret_ref: &SecretRef,
    ) -> Result<()> {
        let decrypted = self
            .decryptor
            .decrypt(&secret_ref.encryption, &secret_ref.records)
            .await?;
        let secret = decrypted
            .iter()
            .fold(Secret::new(self.metadata(name, unit_id)), |s, (k, v)| {
                s.with_data(k, v)
            });
        self.client.create_secret(&secret).await?;
        debug!(unit = %unit_id, secret = %name, keys = decrypted.len(), "created step secret");
        Ok(())
    }

    /// The unit's single log-service credentials secret
    pub async fn provision_logging_secret(
        &self,
        unit_id: &str,
        logging: &LogServiceSpec,
    ) -> Result<String> {
        let name = logging_secret_name(unit_id);
        let secret = Secret::new(self.metadata(&name, unit_id))
            .with_data(LOG_SERVICE_ENDPOINT_KEY, &logging.endpoint)
            .with_data(LOG_SERVICE_TOKEN_KEY, &logging.token)
            .with_data(LOG_KEY_PREFIX_KEY, &logging.key_prefix);
        self.client
            .create_secret(&secret)
            .await
            .map_err(|e| Error::secret_provisioning(&name, e))?;
        debug!(unit = %unit_id, secret = %name, "created logging secret");
        Ok(name)
    }

    fn metadata(&self, name: &str, unit_id: &str) -> ObjectMeta {
        ObjectMeta::for_unit(
            name,
            &self.config.namespace,
            &self.config.unit_label_key,
            unit_id,
        )
    }
}
