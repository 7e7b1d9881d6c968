//! UCP discovery manifest.
//!
//! The manifest tells agents which protocol version this merchant speaks,
//! where the shopping service lives, which capabilities are enabled, and
//! which payment handlers are registered. It is always served — discovery
//! of the discovery endpoint itself is not gateable — but its capability
//! list reflects the settings, so a disabled capability disappears from the
//! manifest at the same moment its endpoint starts returning 403.

use serde::Serialize;

use crate::{
    payment::PaymentHandlerDescriptor,
    settings::{Capability, Settings},
};

/// UCP protocol version this gateway implements.
pub const UCP_VERSION: &str = "2026-01-11";

/// Name of the shopping service in the manifest.
pub const SHOPPING_SERVICE: &str = "dev.ucp.shopping";

/// Complete discovery manifest.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryManifest {
    /// Protocol section.
    pub ucp: UcpSection,
    /// Payment section.
    pub payment: PaymentSection,
}

/// `ucp` section of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct UcpSection {
    /// Protocol version.
    pub version: &'static str,
    /// Offered services.
    pub services: Services,
    /// Enabled capability descriptors.
    pub capabilities: Vec<CapabilityDescriptor>,
}

/// Service map. UCP names services with reverse-DNS keys, so the single
/// shopping service is a renamed field rather than a map.
#[derive(Debug, Clone, Serialize)]
pub struct Services {
    /// The shopping service descriptor.
    #[serde(rename = "dev.ucp.shopping")]
    pub shopping: ServiceDescriptor,
}

/// Descriptor of one offered service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    /// Service version.
    pub version: &'static str,
    /// Specification URL.
    pub spec: &'static str,
    /// REST binding.
    pub rest: RestBinding,
}

/// REST binding of a service.
#[derive(Debug, Clone, Serialize)]
pub struct RestBinding {
    /// OpenAPI schema URL.
    pub schema: &'static str,
    /// Endpoint base URL for this merchant.
    pub endpoint: String,
}

/// Descriptor of one enabled capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescriptor {
    /// Capability name (reverse-DNS).
    pub name: &'static str,
    /// Capability version.
    pub version: &'static str,
    /// Specification URL.
    pub spec: &'static str,
    /// Schema URL.
    pub schema: &'static str,
}

/// `payment` section of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSection {
    /// Registered payment handlers.
    pub handlers: Vec<PaymentHandlerDescriptor>,
}

/// Builds the discovery manifest for the current settings.
#[must_use]
pub fn build_manifest(
    settings: &Settings,
    handlers: Vec<PaymentHandlerDescriptor>,
) -> DiscoveryManifest {
    let endpoint = format!("{}/ucp/v1/", settings.public_url.trim_end_matches('/'));

    DiscoveryManifest {
        ucp: UcpSection {
            version: UCP_VERSION,
            services: Services {
                shopping: ServiceDescriptor {
                    version: UCP_VERSION,
                    spec: "https://ucp.dev/specs/shopping",
                    rest: RestBinding {
                        schema: "https://ucp.dev/services/shopping/openapi.json",
                        endpoint,
                    },
                },
            },
            capabilities: capability_descriptors(settings),
        },
        payment: PaymentSection { handlers },
    }
}

/// Builds the descriptor list for the enabled capabilities.
#[must_use]
pub fn capability_descriptors(settings: &Settings) -> Vec<CapabilityDescriptor> {
    let mut capabilities = Vec::new();

    if settings.capability_enabled(Capability::Checkout) {
        capabilities.push(CapabilityDescriptor {
            name: "dev.ucp.shopping.checkout",
            version: UCP_VERSION,
            spec: "https://ucp.dev/specs/shopping/checkout",
            schema: "https://ucp.dev/schemas/shopping/checkout.json",
        });
    }

    if settings.capability_enabled(Capability::Discovery) {
        capabilities.push(CapabilityDescriptor {
            name: "dev.ucp.shopping.product_discovery",
            version: UCP_VERSION,
            spec: "https://ucp.dev/specs/shopping/discovery",
            schema: "https://ucp.dev/schemas/shopping/discovery.json",
        });
    }

    capabilities
}
