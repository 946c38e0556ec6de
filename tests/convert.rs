use std::path::PathBuf;

use approx::assert_relative_eq;
use collada_conv::convert::NodeKind;
use collada_conv::{convert_dae_file, ConvertConfig, ConvertError, Converter, DaeDocument};

fn document(body: &str) -> DaeDocument {
    DaeDocument::parse_str(&format!("<COLLADA>{body}</COLLADA>")).unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("collada_conv_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(output_directory: PathBuf) -> ConvertConfig {
    ConvertConfig {
        output_directory,
        ..Default::default()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

const TRIANGLE: &str = r##"<library_geometries><geometry id="tri" name="tri"><mesh>
    <source id="tri-p"><float_array count="9">0 0 0 1 0 0 0 1 0</float_array>
        <technique_common><accessor count="3" stride="3"/></technique_common></source>
    <vertices id="tri-v"><input semantic="POSITION" source="#tri-p"/></vertices>
    <triangles count="1" material="mat"><input semantic="VERTEX" source="#tri-v" offset="0"/><p>0 1 2</p></triangles>
</mesh></geometry></library_geometries>"##;

const TRIANGLE_SCENE: &str = r##"<library_visual_scenes><visual_scene id="vs">
    <node id="Box"><instance_geometry url="#tri"/></node>
</visual_scene></library_visual_scenes>"##;

#[test]
fn single_triangle() {
    let doc = document(&format!("{TRIANGLE}{TRIANGLE_SCENE}"));
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(true).unwrap();

    assert_eq!(converter.vertex_count(), 3);
    assert_eq!(converter.index_count(), 3);
    assert_eq!(converter.tri_group_count(), 1);

    let mesh = converter.graph().node(0).mesh().unwrap();
    let group = &mesh.tri_groups[0];
    assert_eq!((group.first, group.count), (0, 3));
    assert_eq!((group.vert_r_start, group.vert_r_end), (0, 3));
    assert!(!converter.has_animation());
}

#[test]
fn quad_without_seams_shares_vertices() {
    let doc = document(
        r##"<library_geometries><geometry id="quad"><mesh>
            <source id="p"><float_array count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
                <technique_common><accessor count="4" stride="3"/></technique_common></source>
            <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
            <triangles count="2"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2 0 2 3</p></triangles>
        </mesh></geometry></library_geometries>
        <library_visual_scenes><visual_scene id="vs">
            <node id="Quad"><instance_geometry url="#quad"/></node>
        </visual_scene></library_visual_scenes>"##,
    );
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(true).unwrap();

    assert_eq!(converter.vertex_count(), 4);
    assert_eq!(converter.index_count(), 6);

    // Both triangles see the same tangent frame at the shared corners.
    let vertices = converter.vertices();
    for v in vertices {
        assert_relative_eq!(v.tangent, vertices[0].tangent, epsilon = 1e-6);
        assert_relative_eq!(v.tangent.dot(v.normal), 0.0, epsilon = 1e-6);
    }
}

#[test]
fn duplicate_names_are_renamed() {
    let doc = document(&format!(
        r##"{TRIANGLE}<library_visual_scenes><visual_scene id="vs">
            <node name="Box"><instance_geometry url="#tri"/></node>
            <node name="Box"><instance_geometry url="#tri"/></node>
        </visual_scene></library_visual_scenes>"##
    ));
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(false).unwrap();

    let names: Vec<_> = converter.graph().nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Box", "Box_1"]);
    assert_eq!(converter.vertex_count(), 6);
}

#[test]
fn extra_material_meshes_get_unused_names() {
    let dir = temp_dir("submesh_names");
    let doc = document(&format!(
        r##"{TRIANGLE}<library_geometries><geometry id="two"><mesh>
            <source id="two-p"><float_array count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
                <technique_common><accessor count="4" stride="3"/></technique_common></source>
            <vertices id="two-v"><input semantic="POSITION" source="#two-p"/></vertices>
            <triangles count="1" material="a"><input semantic="VERTEX" source="#two-v" offset="0"/><p>0 1 2</p></triangles>
            <triangles count="1" material="b"><input semantic="VERTEX" source="#two-v" offset="0"/><p>0 2 3</p></triangles>
        </mesh></geometry></library_geometries>
        <library_visual_scenes><visual_scene id="vs">
            <node name="Body"><instance_geometry url="#two"/></node>
            <node name="Body"/>
        </visual_scene></library_visual_scenes>"##
    ));
    let mut converter = Converter::new(&doc, config(dir.clone()));
    converter.convert_model(true).unwrap();

    let graph = converter.graph();
    let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Body", "Body_1"]);
    let groups = &graph.node(0).mesh().unwrap().tri_groups;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[1].name, "Body_2");

    let (_, scene_path) = converter.write_model("", "body", "").unwrap();
    let scene = std::fs::read_to_string(scene_path).unwrap();
    assert_eq!(scene.matches(r#"name="Body_1""#).count(), 1);
    assert_eq!(scene.matches(r#"name="Body_2""#).count(), 1);
}

#[test]
fn uv_seam_splits_a_position() {
    let doc = document(
        r##"<library_geometries><geometry id="quad"><mesh>
            <source id="p"><float_array count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
                <technique_common><accessor count="4" stride="3"/></technique_common></source>
            <source id="uv"><float_array count="10">0 0 1 0 1 1 0 1 0.5 1</float_array>
                <technique_common><accessor count="5" stride="2"/></technique_common></source>
            <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
            <triangles count="2">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="TEXCOORD" source="#uv" offset="1" set="0"/>
                <p>0 0 1 1 2 2 0 0 2 4 3 3</p>
            </triangles>
        </mesh></geometry></library_geometries>
        <library_visual_scenes><visual_scene id="vs">
            <node id="Quad"><instance_geometry url="#quad"/></node>
        </visual_scene></library_visual_scenes>"##,
    );
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(false).unwrap();

    // Position 2 has two different UVs, every other position keeps one vertex.
    assert_eq!(converter.vertex_count(), 5);
    assert_eq!(converter.index_count(), 6);

    let group = &converter.graph().node(0).mesh().unwrap().tri_groups[0];
    assert_eq!(group.pos_index_to_vertices[2], vec![2, 3]);
    for (position, vertices) in group.pos_index_to_vertices.iter().enumerate() {
        if position != 2 {
            assert_eq!(vertices.len(), 1);
        }
    }

    let vertices = converter.vertices();
    assert_ne!(vertices[2].tex_coords[0], vertices[3].tex_coords[0]);
    assert_eq!(vertices[2].tangent, vertices[3].tangent);
    assert_eq!(vertices[2].bitangent, vertices[3].bitangent);
}

fn identity_matrices(count: usize) -> String {
    "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1 ".repeat(count)
}

fn skinned_document(mesh_inside_joint: bool) -> String {
    let skin = format!(
        r##"<library_controllers><controller id="skin"><skin source="#tri">
            <source id="joints"><Name_array count="5">bone0 bone1 bone2 bone3 bone4</Name_array></source>
            <source id="binds"><float_array count="80">{}</float_array></source>
            <source id="weights"><float_array count="6">0.1 0.2 0.3 0.25 0.15 1</float_array></source>
            <joints><input semantic="JOINT" source="#joints"/><input semantic="INV_BIND_MATRIX" source="#binds"/></joints>
            <vertex_weights count="3">
                <input semantic="JOINT" source="#joints" offset="0"/>
                <input semantic="WEIGHT" source="#weights" offset="1"/>
                <vcount>5 1 1</vcount>
                <v>0 0 1 1 2 2 3 3 4 4 1 5 1 5</v>
            </vertex_weights>
        </skin></controller></library_controllers>"##,
        identity_matrices(5)
    );

    let body = r##"<instance_controller url="#skin"><skeleton>#root</skeleton></instance_controller>"##;
    let bones = r#"<node id="bone0" sid="bone0" type="JOINT"/>
        <node id="bone1" sid="bone1" type="JOINT"/>
        <node id="bone2" sid="bone2" type="JOINT"/>
        <node id="bone3" sid="bone3" type="JOINT"/>"#;
    let scene = if mesh_inside_joint {
        format!(
            r#"<node id="root" sid="root" type="JOINT">{bones}
                <node id="bone4" sid="bone4" type="JOINT"><node id="body">{body}</node></node>
            </node>"#
        )
    } else {
        format!(
            r#"<node id="body">{body}</node>
            <node id="root" sid="root" type="JOINT">{bones}<node id="bone4" sid="bone4" type="JOINT"/></node>"#
        )
    };

    format!(
        r#"<COLLADA>{TRIANGLE}{skin}<library_visual_scenes><visual_scene id="vs">{scene}</visual_scene></library_visual_scenes></COLLADA>"#
    )
}

#[test]
fn skin_weights_are_limited_and_normalized() {
    let doc = DaeDocument::parse_str(&skinned_document(false)).unwrap();
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(true).unwrap();

    for v in converter.vertices() {
        let influences = v.joints.iter().filter(|j| j.is_some()).count();
        assert!(influences >= 1 && influences <= 4);
        assert_relative_eq!(v.weights.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    }

    // bone0 has the smallest weight and is dropped.
    let graph = converter.graph();
    let used: Vec<_> = converter.joints().iter().map(|&j| graph.node(j).name.as_str()).collect();
    assert_eq!(used, vec!["root", "bone1", "bone2", "bone3", "bone4"]);

    let indices: Vec<_> = converter
        .joints()
        .iter()
        .map(|&j| graph.node(j).joint().unwrap().index.unwrap())
        .collect();
    assert_eq!(indices, (0..indices.len() as u32).collect::<Vec<_>>());
}

#[test]
fn skin_bound_to_ancestor_fails_without_output() {
    let dir = temp_dir("ancestor");
    let path = dir.join("body.dae");
    std::fs::write(&path, skinned_document(true)).unwrap();

    let out = dir.join("out");
    let result = convert_dae_file(&path, &config(out.clone()));
    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ConvertError>(),
        Some(ConvertError::SkinBindsAncestor { .. })
    ));
    assert!(!out.join("body.geo").exists());
    assert!(!out.join("body.scene.xml").exists());

    let doc = DaeDocument::parse_str(&skinned_document(true)).unwrap();
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    assert!(converter.convert_model(true).is_err());
    assert_eq!(converter.vertex_count(), 0);
    assert!(matches!(
        converter.write_model("", "body", ""),
        Err(ConvertError::NotConverted)
    ));
}

#[test]
fn identical_morph_target_has_no_diffs() {
    let copy = TRIANGLE.replace("\"tri", "\"tri_copy").replace("#tri", "#tri_copy");
    let doc = document(&format!(
        r##"{TRIANGLE}{copy}<library_controllers><controller id="morph"><morph source="#tri">
            <source id="targets"><IDREF_array count="1">tri_copy</IDREF_array></source>
            <targets><input semantic="MORPH_TARGET" source="#targets"/></targets>
        </morph></controller></library_controllers>
        <library_visual_scenes><visual_scene id="vs">
            <node id="Face"><instance_controller url="#morph"/></node>
        </visual_scene></library_visual_scenes>"##
    ));
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(true).unwrap();

    let targets = converter.morph_targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "tri_copy");
    assert!(targets[0].diffs.is_empty());
}

#[test]
fn animation_frames_for_every_node() {
    let doc = document(&format!(
        r##"{TRIANGLE}<library_animations><animation id="move">
            <source id="t"><float_array count="3">0 0.5 1</float_array></source>
            <source id="x"><float_array count="3">0 1 2</float_array></source>
            <sampler id="s"><input semantic="INPUT" source="#t"/><input semantic="OUTPUT" source="#x"/></sampler>
            <channel source="#s" target="Box/location.X"/>
        </animation></library_animations>
        <library_visual_scenes><visual_scene id="vs">
            <node id="Box"><translate sid="location">0 0 0</translate><instance_geometry url="#tri"/></node>
            <node id="Static"><translate sid="location">0 5 0</translate></node>
        </visual_scene></library_visual_scenes>"##
    ));
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(true).unwrap();

    assert_eq!(converter.frame_count(), 3);
    assert!(converter.has_animation());
    for node in &converter.graph().nodes {
        assert_eq!(node.frames.len(), 3);
    }
    let moving = &converter.graph().nodes[0];
    assert_relative_eq!(moving.frames[2].w_axis.x, 2.0, epsilon = 1e-6);

    let dir = temp_dir("animation");
    let converter = {
        let mut c = Converter::new(&doc, config(dir.clone()));
        c.convert_model(true).unwrap();
        c
    };
    let path = converter.write_animation("", "box").unwrap();
    let bytes = std::fs::read(path).unwrap();
    assert_eq!(&bytes[..4], b"H3DA");
    assert_eq!(read_u32(&bytes, 4), 3);
    assert_eq!(read_u32(&bytes, 8), 2);
    assert_eq!(read_u32(&bytes, 12), 3);
    // Box: name, flag and three frames of 40 bytes each.
    assert_eq!(bytes[16 + 256], 0);
    let static_node = 16 + 256 + 1 + 3 * 40;
    assert_eq!(bytes[static_node + 256], 1);
    assert_eq!(bytes.len(), static_node + 256 + 1 + 40);
}

#[test]
fn geometry_file_layout() {
    let dir = temp_dir("geometry");
    let doc = document(&format!("{TRIANGLE}{TRIANGLE_SCENE}"));
    let mut converter = Converter::new(&doc, config(dir.clone()));
    converter.convert_model(true).unwrap();

    let (geometry_path, scene_path) = converter.write_model("models", "box", "").unwrap();
    assert_eq!(geometry_path, dir.join("models").join("box.geo"));

    let bytes = std::fs::read(&geometry_path).unwrap();
    assert_eq!(&bytes[..4], b"H3DG");
    assert_eq!(read_u32(&bytes, 4), 5);
    // Only the root joint.
    assert_eq!(read_u32(&bytes, 8), 1);
    let streams = 12 + 64;
    assert_eq!(read_u32(&bytes, streams), 5);
    assert_eq!(read_u32(&bytes, streams + 4), 3);
    assert_eq!(read_u32(&bytes, streams + 8), 0);
    assert_eq!(read_u32(&bytes, streams + 12), 12);

    // positions, three 6 byte streams, one uv set
    let stream_bytes = (8 + 3 * 12) + 3 * (8 + 3 * 6) + (8 + 3 * 8);
    let index_count = streams + 8 + stream_bytes;
    assert_eq!(read_u32(&bytes, index_count), 3);
    let morph_count = index_count + 4 + 3 * 4;
    assert_eq!(read_u32(&bytes, morph_count), 0);
    assert_eq!(bytes.len(), morph_count + 4);

    let scene = std::fs::read_to_string(scene_path).unwrap();
    assert!(scene.contains(r#"geometry="models/box.geo""#));
    assert!(scene.contains(r#"batchCount="3""#));
    assert!(scene.contains(r#"vertREnd="2""#));
}

#[test]
fn materials_are_preserved_unless_replaced() {
    let dir = temp_dir("materials");
    let doc = document(&format!(
        r##"{TRIANGLE}<library_materials>
            <material id="wood-mat" name="Wood"><instance_effect url="#wood-fx"/></material>
        </library_materials>
        <library_visual_scenes><visual_scene id="vs">
            <node id="Box"><instance_geometry url="#tri"><bind_material><technique_common>
                <instance_material symbol="mat" target="#wood-mat"/>
            </technique_common></bind_material></instance_geometry></node>
        </visual_scene></library_visual_scenes>"##
    ));
    let mut converter = Converter::new(&doc, config(dir.clone()));
    converter.convert_model(true).unwrap();

    let written = converter.write_materials("", "", false).unwrap();
    let path = dir.join("Wood.material.xml");
    assert_eq!(written, vec![path.clone()]);
    assert!(std::fs::read_to_string(&path).unwrap().contains("<Material>"));

    std::fs::write(&path, "edited").unwrap();
    assert!(converter.write_materials("", "", false).unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited");

    assert_eq!(converter.write_materials("", "", true).unwrap(), vec![path.clone()]);
    assert_ne!(std::fs::read_to_string(&path).unwrap(), "edited");

    let prefixed = converter.write_materials("", "box_", false).unwrap();
    assert_eq!(prefixed, vec![dir.join("box_Wood.material.xml")]);
}

#[test]
fn convert_file_writes_all_outputs() {
    let dir = temp_dir("file");
    let path = dir.join("crate.dae");
    std::fs::write(&path, format!("<COLLADA>{TRIANGLE}{TRIANGLE_SCENE}</COLLADA>")).unwrap();

    let out = dir.join("out");
    let files = convert_dae_file(&path, &config(out.clone())).unwrap();
    assert_eq!(files.geometry_path, out.join("crate.geo"));
    assert_eq!(files.scene_path, out.join("crate.scene.xml"));
    assert_eq!(files.material_paths.len(), 1);
    assert_eq!(files.animation_path, None);
    assert!(files.geometry_path.exists());

    let doc = DaeDocument::parse_file(&path).unwrap();
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    converter.convert_model(false).unwrap();
    assert!(matches!(converter.graph().node(0).kind, NodeKind::Mesh(_)));
}

#[test]
fn too_many_joints_fail_the_conversion() {
    let count = 300;
    let mut chain = String::new();
    for i in 0..count {
        chain.push_str(&format!(r#"<node id="j{i}" sid="j{i}" type="JOINT">"#));
    }
    chain.push_str(&"</node>".repeat(count));

    let doc = document(&format!(
        r##"{TRIANGLE}<library_controllers><controller id="skin"><skin source="#tri">
            <source id="joints"><Name_array count="1">j{last}</Name_array></source>
            <source id="binds"><float_array count="16">{binds}</float_array></source>
            <source id="weights"><float_array count="1">1</float_array></source>
            <joints><input semantic="JOINT" source="#joints"/><input semantic="INV_BIND_MATRIX" source="#binds"/></joints>
            <vertex_weights count="3">
                <input semantic="JOINT" source="#joints" offset="0"/>
                <input semantic="WEIGHT" source="#weights" offset="1"/>
                <vcount>1 1 1</vcount>
                <v>0 0 0 0 0 0</v>
            </vertex_weights>
        </skin></controller></library_controllers>
        <library_visual_scenes><visual_scene id="vs">
            <node id="body"><instance_controller url="#skin"><skeleton>#j0</skeleton></instance_controller></node>
            {chain}
        </visual_scene></library_visual_scenes>"##,
        last = count - 1,
        binds = identity_matrices(1),
    ));
    let mut converter = Converter::new(&doc, ConvertConfig::default());
    let result = converter.convert_model(true);
    assert!(matches!(result, Err(ConvertError::TooManyJoints(300))));
    assert!(matches!(
        converter.write_model("", "body", ""),
        Err(ConvertError::NotConverted)
    ));
}

#[test]
fn repeated_conversions_write_identical_files() {
    let source = skinned_document(false)
        .replace(
            r#"<node id="bone1" sid="bone1" type="JOINT"/>"#,
            r#"<node id="bone1" sid="bone1" type="JOINT"><translate sid="location">0 0 0</translate></node>"#,
        )
        .replace(
            "<library_visual_scenes>",
            r##"<library_animations><animation id="wave">
                <source id="t"><float_array count="3">0 0.5 1</float_array></source>
                <source id="x"><float_array count="3">0 1 0.5</float_array></source>
                <sampler id="s"><input semantic="INPUT" source="#t"/><input semantic="OUTPUT" source="#x"/></sampler>
                <channel source="#s" target="bone1/location.X"/>
            </animation></library_animations><library_visual_scenes>"##,
        );
    let doc = DaeDocument::parse_str(&source).unwrap();

    let write = |name: &str| {
        let dir = temp_dir(name);
        let mut converter = Converter::new(&doc, config(dir));
        converter.convert_model(true).unwrap();
        assert!(converter.has_animation());
        let (geometry, scene) = converter.write_model("models", "body", "").unwrap();
        let animation = converter.write_animation("models", "body").unwrap();
        [geometry, scene, animation].map(|path| std::fs::read(path).unwrap())
    };

    let first = write("repeat_a");
    let second = write("repeat_b");
    for (a, b) in first.iter().zip(&second) {
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}
