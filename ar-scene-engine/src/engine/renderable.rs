/// Descriptor geometry and materials to engine-native drawables
use std::sync::Arc;

use bevy::asset::RenderAssetUsages;
use bevy::ecs::system::SystemParam;
use bevy::gltf::GltfAssetLabel;
use bevy::prelude::*;
use bevy::scene::SceneRoot;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use constants::render_settings::{
    DEFAULT_REFLECTANCE, DEFAULT_ROUGHNESS, DEFAULT_SHAPE_ARGB, IMAGE_PIXELS_PER_METRE,
};

use super::descriptor::{MaterialSpec, NodeDescriptor, NodeKindTag, ShapeSpec};
use crate::error::NodeBuildError;

/// Output of a renderable build, not yet registered as assets.
#[derive(Debug)]
pub enum Renderable {
    /// Container node with no geometry of its own.
    Empty,
    Mesh {
        mesh: Mesh,
        material: StandardMaterial,
        texture: Option<Image>,
    },
    /// Model loaded through the asset server from this path.
    Model { path: String },
}

/// Turns a descriptor into a renderable. Runs on the async compute pool.
pub trait RenderableBuilder: Send + Sync + 'static {
    fn build(&self, descriptor: &NodeDescriptor) -> Result<Renderable, NodeBuildError>;
}

/// Asset storage a finished renderable is registered into.
#[derive(SystemParam)]
pub struct NodeAssets<'w> {
    pub meshes: ResMut<'w, Assets<Mesh>>,
    pub materials: ResMut<'w, Assets<StandardMaterial>>,
    pub images: ResMut<'w, Assets<Image>>,
    pub asset_server: Option<Res<'w, AssetServer>>,
}

/// Asset handles of an instantiated renderable.
#[derive(Debug, Clone, Default)]
pub enum RenderHandles {
    #[default]
    None,
    Mesh {
        mesh: Handle<Mesh>,
        material: Handle<StandardMaterial>,
    },
    Model(Handle<Scene>),
}

impl RenderHandles {
    pub fn insert_into(self, entity: &mut EntityCommands) {
        match self {
            Self::None => {}
            Self::Mesh { mesh, material } => {
                entity.insert((Mesh3d(mesh), MeshMaterial3d(material)));
            }
            Self::Model(scene) => {
                entity.insert(SceneRoot(scene));
            }
        }
    }
}

impl NodeAssets<'_> {
    pub fn add_material(
        &mut self,
        mut material: StandardMaterial,
        texture: Option<Image>,
    ) -> Handle<StandardMaterial> {
        if let Some(texture) = texture {
            material.base_color_texture = Some(self.images.add(texture));
        }
        self.materials.add(material)
    }

    /// Register a built renderable's assets.
    pub fn instantiate(&mut self, renderable: Renderable) -> Result<RenderHandles, NodeBuildError> {
        match renderable {
            Renderable::Empty => Ok(RenderHandles::None),
            Renderable::Mesh {
                mesh,
                material,
                texture,
            } => {
                let material = self.add_material(material, texture);
                Ok(RenderHandles::Mesh {
                    mesh: self.meshes.add(mesh),
                    material,
                })
            }
            Renderable::Model { path } => {
                let Some(asset_server) = &self.asset_server else {
                    return Err(NodeBuildError::ModelSource(format!(
                        "no asset server to load '{path}'"
                    )));
                };
                Ok(RenderHandles::Model(
                    asset_server.load(GltfAssetLabel::Scene(0).from_asset(path)),
                ))
            }
        }
    }
}

/// Shared builder used by the node factory.
#[derive(Resource, Clone)]
pub struct RenderableFactory(pub Arc<dyn RenderableBuilder>);

impl Default for RenderableFactory {
    fn default() -> Self {
        Self(Arc::new(PrimitiveRenderableBuilder))
    }
}

/// Builds primitive shapes, image quads and model references.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimitiveRenderableBuilder;

impl RenderableBuilder for PrimitiveRenderableBuilder {
    fn build(&self, descriptor: &NodeDescriptor) -> Result<Renderable, NodeBuildError> {
        if descriptor.kind == NodeKindTag::Reference {
            return model_source(descriptor).map(|path| Renderable::Model { path });
        }

        if let Some(shape) = &descriptor.shape {
            let mesh = shape_mesh(shape)?;
            let (material, texture) = material_from_spec(shape.materials().first())?;
            return Ok(Renderable::Mesh {
                mesh,
                material,
                texture,
            });
        }

        if let Some(image) = &descriptor.image {
            if image.width == 0 || image.height == 0 {
                return Err(NodeBuildError::Geometry(format!(
                    "image node '{}' has zero size",
                    descriptor.name
                )));
            }
            let texture = decode_texture(&image.bytes)?;
            let quad = Rectangle::new(
                image.width as f32 / IMAGE_PIXELS_PER_METRE,
                image.height as f32 / IMAGE_PIXELS_PER_METRE,
            );
            return Ok(Renderable::Mesh {
                mesh: Mesh::from(quad),
                material: StandardMaterial {
                    base_color: Color::WHITE,
                    alpha_mode: AlphaMode::Blend,
                    unlit: true,
                    ..default()
                },
                texture: Some(texture),
            });
        }

        Ok(Renderable::Empty)
    }
}

fn model_source(descriptor: &NodeDescriptor) -> Result<String, NodeBuildError> {
    descriptor
        .object_3d_file_name
        .as_deref()
        .or(descriptor.object_url.as_deref())
        .filter(|path| !path.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            NodeBuildError::ModelSource(format!(
                "reference node '{}' has neither objectUrl nor object3DFileName",
                descriptor.name
            ))
        })
}

fn shape_mesh(shape: &ShapeSpec) -> Result<Mesh, NodeBuildError> {
    let positive = |value: f32| value.is_finite() && value > 0.0;
    match *shape {
        ShapeSpec::Sphere { radius, .. } => {
            if !positive(radius) {
                return Err(NodeBuildError::Geometry(format!(
                    "sphere radius {radius} must be positive"
                )));
            }
            Ok(Mesh::from(Sphere::new(radius)))
        }
        ShapeSpec::Cube { size, .. } => {
            if !size.iter().copied().all(positive) {
                return Err(NodeBuildError::Geometry(format!(
                    "cube size {size:?} must be positive"
                )));
            }
            Ok(Mesh::from(Cuboid::new(size[0], size[1], size[2])))
        }
        ShapeSpec::Cylinder { radius, height, .. } => {
            if !positive(radius) || !positive(height) {
                return Err(NodeBuildError::Geometry(format!(
                    "cylinder {radius}x{height} must be positive"
                )));
            }
            Ok(Mesh::from(Cylinder::new(radius, height)))
        }
    }
}

/// ARGB bytes as sent by the remote layer.
pub fn argb_color(argb: [u8; 4]) -> Color {
    let [a, r, g, b] = argb;
    Color::srgba_u8(r, g, b, a)
}

/// Fresh material for a shape, with the default tint when no spec is given.
pub fn material_from_spec(
    spec: Option<&MaterialSpec>,
) -> Result<(StandardMaterial, Option<Image>), NodeBuildError> {
    let mut material = StandardMaterial {
        base_color: argb_color(DEFAULT_SHAPE_ARGB),
        perceptual_roughness: DEFAULT_ROUGHNESS,
        reflectance: DEFAULT_REFLECTANCE,
        ..default()
    };
    let texture = match spec {
        Some(spec) => apply_material_spec(&mut material, spec)?,
        None => None,
    };
    Ok((material, texture))
}

/// Apply the fields a spec sets; returns the decoded texture, if any.
pub fn apply_material_spec(
    material: &mut StandardMaterial,
    spec: &MaterialSpec,
) -> Result<Option<Image>, NodeBuildError> {
    // Decode first so a bad texture leaves the material untouched.
    let texture = spec
        .texture_bytes
        .as_deref()
        .map(decode_texture)
        .transpose()?;

    if let Some(argb) = spec.color {
        material.base_color = argb_color(argb);
        if argb[0] < u8::MAX {
            material.alpha_mode = AlphaMode::Blend;
        }
    }
    if let Some(metallic) = spec.metallic {
        material.metallic = metallic.clamp(0.0, 1.0);
    }
    if let Some(roughness) = spec.roughness {
        material.perceptual_roughness = roughness.clamp(0.089, 1.0);
    }
    if let Some(reflectance) = spec.reflectance {
        material.reflectance = reflectance.clamp(0.0, 1.0);
    }
    Ok(texture)
}

/// Decode PNG/JPEG bytes into an sRGB texture.
pub fn decode_texture(bytes: &[u8]) -> Result<Image, NodeBuildError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| NodeBuildError::Texture(e.to_string()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();

    Ok(Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        decoded.into_raw(),
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    ))
}
