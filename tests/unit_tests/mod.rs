mod coefficient_field;
mod fem;
mod mesh;
mod multi_index;
mod multi_vector;
