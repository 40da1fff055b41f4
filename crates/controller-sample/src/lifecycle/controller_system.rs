use super::ResourceController;
use crate::backend::{self, RemoteClient, ServiceScope};
use crate::managers::{BucketManagerFactory, SubnetManagerFactory, VpcManagerFactory};
use crate::model::{BucketRecord, SubnetContext, SubnetRecord, VpcRecord};
use controller_runtime::{
    ControllerConfig, FactoryRegistry, InMemoryReader, Metrics, Reconciler, ResourceManagerFactory,
    ResourceReconciler, Result, SecretStore, ServiceControllerMetadata, Session, TenantRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A running controller for buckets, VPCs and subnets over simulated services.
///
/// `ControllerSystem` is responsible for:
/// - **Services**: spawning one service actor per resource kind
/// - **Wiring**: handing each factory its service client, and the subnet
///   service a client for the VPC service it validates against
/// - **Tenancy**: building the home tenant's managers through a
///   [`TenantRegistry`] per type
/// - **Shutdown**: dropping every client and waiting for the services to stop
///
/// # Example
///
/// ```ignore
/// let system = ControllerSystem::new(config, &session)?;
/// let outcome = system.buckets.converge(bucket, 10).await;
/// system.shutdown().await?;
/// ```
pub struct ControllerSystem {
    pub buckets: ResourceController<BucketManagerFactory>,
    pub vpcs: ResourceController<VpcManagerFactory>,
    pub subnets: ResourceController<SubnetManagerFactory>,

    /// Direct handles on the services, for inspecting remote state.
    pub bucket_service: RemoteClient<BucketRecord>,
    pub vpc_service: RemoteClient<VpcRecord>,
    pub subnet_service: RemoteClient<SubnetRecord>,

    pub factories: FactoryRegistry,
    pub reader: InMemoryReader,
    pub secrets: SecretStore,
    pub metrics: Metrics,

    handles: Vec<JoinHandle<()>>,
}

impl ControllerSystem {
    /// Starts a system whose resources are ready as soon as they are created.
    pub fn new(config: ControllerConfig, session: &Session) -> Result<Self> {
        Self::with_provisioning_delay(config, session, Duration::ZERO)
    }

    /// Starts a system whose VPCs stay pending for `delay` after creation.
    pub fn with_provisioning_delay(
        config: ControllerConfig,
        session: &Session,
        delay: Duration,
    ) -> Result<Self> {
        let scope = ServiceScope::new(config.account_id.clone(), config.region.clone())
            .with_provisioning_delay(delay);

        // 1. Services, no dependencies yet
        let (bucket_actor, bucket_service) = backend::new::<BucketRecord>();
        let (vpc_actor, vpc_service) = backend::new::<VpcRecord>();
        let (subnet_actor, subnet_service) = backend::new::<SubnetRecord>();

        // 2. Start them; subnets validate their VPC through the VPC service
        let handles = vec![
            tokio::spawn(bucket_actor.run(scope.clone())),
            tokio::spawn(vpc_actor.run(scope.clone())),
            tokio::spawn(subnet_actor.run(SubnetContext {
                scope,
                vpcs: vpc_service.clone(),
            })),
        ];

        // 3. Factories and the home tenant's managers
        let metrics = Metrics::new();
        let secrets = SecretStore::new();
        let reader = InMemoryReader::new();
        let services: Arc<dyn Reconciler> = Arc::new(secrets.clone());
        let wiring = Wiring {
            config: &config,
            session,
            metrics: &metrics,
            services: &services,
            reader: &reader,
        };

        let bucket_factory = Arc::new(BucketManagerFactory::new(bucket_service.clone()));
        let vpc_factory = Arc::new(VpcManagerFactory::new(vpc_service.clone()));
        let subnet_factory = Arc::new(SubnetManagerFactory::new(subnet_service.clone()));

        let mut factories = FactoryRegistry::new();
        factories.register(bucket_factory.clone())?;
        factories.register(vpc_factory.clone())?;
        factories.register(subnet_factory.clone())?;

        let buckets = wiring.controller(bucket_factory, "s3")?;
        let vpcs = wiring.controller(vpc_factory, "ec2")?;
        let subnets = wiring.controller(subnet_factory, "ec2")?;

        info!(
            account = %config.account_id,
            region = %config.region,
            kinds = factories.len(),
            "Controller system started"
        );

        Ok(Self {
            buckets,
            vpcs,
            subnets,
            bucket_service,
            vpc_service,
            subnet_service,
            factories,
            reader,
            secrets,
            metrics,
            handles,
        })
    }

    /// Stops every service and waits for it to finish.
    ///
    /// Dropping the controllers drops the managers and with them the last
    /// service clients, which ends each service's loop.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down controller system");

        drop(self.buckets);
        drop(self.vpcs);
        drop(self.subnets);
        drop(self.factories);
        drop(self.bucket_service);
        drop(self.vpc_service);
        drop(self.subnet_service);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Service task failed: {:?}", e);
                return Err(format!("Service task failed: {:?}", e));
            }
        }

        info!("Controller system stopped");
        Ok(())
    }
}

/// The shared pieces every resource controller is built from.
struct Wiring<'a> {
    config: &'a ControllerConfig,
    session: &'a Session,
    metrics: &'a Metrics,
    services: &'a Arc<dyn Reconciler>,
    reader: &'a InMemoryReader,
}

impl Wiring<'_> {
    fn controller<F: ResourceManagerFactory>(
        &self,
        factory: Arc<F>,
        service_alias: &str,
    ) -> Result<ResourceController<F>> {
        let managers = TenantRegistry::new(
            factory.clone(),
            self.config.clone(),
            self.metrics.clone(),
            self.services.clone(),
        );
        let manager =
            managers.manager_for(self.session, &self.config.account_id, &self.config.region)?;
        let reconciler = ResourceReconciler::new(
            factory.as_ref(),
            manager,
            Arc::new(self.reader.clone()),
            ServiceControllerMetadata::new(service_alias, VERSION),
            self.config.clone(),
        );
        Ok(ResourceController::new(managers, reconciler, self.reader.clone()))
    }
}
