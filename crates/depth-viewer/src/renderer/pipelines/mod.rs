pub mod depth_points;
